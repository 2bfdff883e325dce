//! User reconcile driver (spec.md §4.9).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::{Event, EventType};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};

use nauth_provider::UserContext;
use nauth_types::account::Account;
use nauth_types::condition::{
    set_condition, ConditionStatus, REASON_ERRORED, REASON_RECONCILED, REASON_RECONCILING, TYPE_READY,
};
use nauth_types::labels::{LABEL_ACCOUNT_ID, LABEL_USER_ACCOUNT_ID, LABEL_USER_ID, LABEL_USER_SIGNED_BY};
use nauth_types::user::{User, UserStatus};

use crate::context::Context;
use crate::error::{finalizer_err, requeue_after, Error};

const FINALIZER: &str = "nauth.io/user";
const FIELD_MANAGER: &str = "nauth-controller";
const DEFAULT_REQUEUE: Duration = Duration::from_secs(5 * 60);

async fn patch_labels(api: &Api<User>, name: &str, labels: BTreeMap<String, String>) -> Result<(), Error> {
    let patch = serde_json::json!({
        "apiVersion": "nauth.io/v1alpha1",
        "kind": "User",
        "metadata": { "labels": labels },
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch))
        .await?;
    Ok(())
}

async fn patch_status(api: &Api<User>, name: &str, status: &UserStatus) -> Result<(), Error> {
    let patch = serde_json::json!({
        "apiVersion": "nauth.io/v1alpha1",
        "kind": "User",
        "status": status,
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch))
        .await?;
    Ok(())
}

/// Fetches the owning `Account` best-effort (it may already be gone by the
/// time a `User` is deleted, spec.md §7 "Not-found during delete").
async fn owning_account(client: &Client, namespace: &str, account_name: &str) -> Option<Account> {
    let api: Api<Account> = Api::namespaced(client.clone(), namespace);
    api.get_opt(account_name).await.ok().flatten()
}

async fn reconcile_apply(user: Arc<User>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = user
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("user has no namespace".into()))?;
    let name = user.name_any();
    let api: Api<User> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = user.metadata.generation.unwrap_or(0);
    let mut status = user.status.clone().unwrap_or_default();

    if status.observed_generation == generation
        && status.observed_operator_version.as_deref() == Some(ctx.operator_version.as_str())
    {
        return Ok(Action::await_change());
    }

    set_condition(
        &mut status.conditions,
        TYPE_READY,
        ConditionStatus::False,
        REASON_RECONCILING,
        "Reconciling",
        generation,
    );
    patch_status(&api, &name, &status).await?;

    let labels = user.metadata.labels.clone().unwrap_or_default();
    let user_id = labels.get(LABEL_USER_ID).cloned();
    let account = owning_account(&ctx.client, &namespace, &user.spec.account_name).await;
    let account_id = labels.get(LABEL_USER_ACCOUNT_ID).cloned().or_else(|| {
        account
            .as_ref()
            .and_then(|a| a.metadata.labels.as_ref())
            .and_then(|l| l.get(LABEL_ACCOUNT_ID).cloned())
    });
    let cluster_ref = account.as_ref().and_then(|a| a.spec.nats_cluster_ref.clone());

    let provider_ctx = UserContext {
        namespace: namespace.clone(),
        user_name: name.clone(),
        user_id,
        account_id,
        spec: user.spec.clone(),
        owner_uid: user.metadata.uid.clone().unwrap_or_default(),
    };

    let (provider, _periodic_sync) = ctx
        .resolver
        .resolve_for_account(cluster_ref.as_ref(), &namespace, ctx.default_cluster_ref.as_deref())
        .await?;

    let recorder = ctx.recorder();
    match provider.create_or_update_user(&provider_ctx).await {
        Ok(outcome) => {
            let mut new_labels = labels.clone();
            new_labels.insert(LABEL_USER_ID.to_string(), outcome.user_id.clone());
            new_labels.insert(LABEL_USER_ACCOUNT_ID.to_string(), outcome.user_account_id.clone());
            new_labels.insert(LABEL_USER_SIGNED_BY.to_string(), outcome.user_signed_by.clone());
            patch_labels(&api, &name, new_labels).await?;

            status.observed_generation = generation;
            status.observed_operator_version = Some(ctx.operator_version.clone());
            status.reconcile_timestamp = Some(chrono::Utc::now());
            set_condition(&mut status.conditions, TYPE_READY, ConditionStatus::True, REASON_RECONCILED, "", generation);
            patch_status(&api, &name, &status).await?;

            recorder
                .publish(
                    &Event {
                        type_: EventType::Normal,
                        reason: "Reconciled".into(),
                        note: Some(format!("user {} reconciled", outcome.user_id)),
                        action: "Reconciling".into(),
                        secondary: None,
                    },
                    &user.object_ref(&()),
                )
                .await?;

            Ok(outcome.requeue_after.map(Action::requeue).unwrap_or(Action::requeue(DEFAULT_REQUEUE)))
        }
        Err(err) => {
            set_condition(&mut status.conditions, TYPE_READY, ConditionStatus::False, REASON_ERRORED, err.to_string(), generation);
            let _ = patch_status(&api, &name, &status).await;
            let _ = recorder
                .publish(
                    &Event {
                        type_: EventType::Warning,
                        reason: "Errored".into(),
                        note: Some(err.to_string()),
                        action: "Reconciling".into(),
                        secondary: None,
                    },
                    &user.object_ref(&()),
                )
                .await;
            Err(err.into())
        }
    }
}

async fn cleanup(user: Arc<User>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = user
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("user has no namespace".into()))?;
    let name = user.name_any();
    let api: Api<User> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = user.metadata.generation.unwrap_or(0);
    let mut status = user.status.clone().unwrap_or_default();

    set_condition(
        &mut status.conditions,
        TYPE_READY,
        ConditionStatus::False,
        REASON_RECONCILING,
        "Deleting",
        generation,
    );
    patch_status(&api, &name, &status).await?;

    let labels = user.metadata.labels.clone().unwrap_or_default();
    let user_id = labels.get(LABEL_USER_ID).cloned();
    let account = owning_account(&ctx.client, &namespace, &user.spec.account_name).await;
    let account_id = labels.get(LABEL_USER_ACCOUNT_ID).cloned().or_else(|| {
        account
            .as_ref()
            .and_then(|a| a.metadata.labels.as_ref())
            .and_then(|l| l.get(LABEL_ACCOUNT_ID).cloned())
    });
    let cluster_ref = account.as_ref().and_then(|a| a.spec.nats_cluster_ref.clone());

    let (provider, _) = ctx
        .resolver
        .resolve_for_account(cluster_ref.as_ref(), &namespace, ctx.default_cluster_ref.as_deref())
        .await?;

    let provider_ctx = UserContext {
        namespace: namespace.clone(),
        user_name: name.clone(),
        user_id,
        account_id,
        spec: user.spec.clone(),
        owner_uid: user.metadata.uid.clone().unwrap_or_default(),
    };
    provider.delete_user(&provider_ctx).await?;

    ctx.recorder()
        .publish(
            &Event {
                type_: EventType::Normal,
                reason: "Deleted".into(),
                note: Some(format!("user {name} deleted")),
                action: "Deleting".into(),
                secondary: None,
            },
            &user.object_ref(&()),
        )
        .await?;

    Ok(Action::await_change())
}

async fn reconcile(user: Arc<User>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = user
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("user has no namespace".into()))?;
    let api: Api<User> = Api::namespaced(ctx.client.clone(), &namespace);
    finalizer(&api, FINALIZER, user, |event| async {
        match event {
            FinalizerEvent::Apply(user) => reconcile_apply(user, ctx.clone()).await,
            FinalizerEvent::Cleanup(user) => cleanup(user, ctx.clone()).await,
        }
    })
    .await
    .map_err(finalizer_err)
}

fn error_policy(user: Arc<User>, err: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(user = %user.name_any(), error = %err, "user reconcile failed");
    requeue_after(err)
}

/// Runs the User controller to completion (spec.md §4.9 "MaxConcurrentReconciles is 1").
pub async fn run(client: Client, ctx: Arc<Context>) {
    let users = Api::<User>::all(client);
    Controller::new(users, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .filter_map(|res| async move { res.ok() })
        .for_each(|_| futures::future::ready(()))
        .await;
}
