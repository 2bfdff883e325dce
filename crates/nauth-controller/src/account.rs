//! Account reconcile driver (spec.md §4.9).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::events::{Event, EventType};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};

use nauth_provider::{AccountContext, ProviderError};
use nauth_types::account::{Account, AccountStatus};
use nauth_types::cluster_ref::ClusterRef;
use nauth_types::condition::{
    set_condition, ConditionStatus, REASON_ERRORED, REASON_RECONCILED, REASON_RECONCILING, TYPE_READY,
};
use nauth_types::labels::{is_observe_policy, LABEL_ACCOUNT_ID, LABEL_ACCOUNT_SIGNED_BY, LABEL_USER_ACCOUNT_ID};
use nauth_types::system::System;
use nauth_types::user::User;

use crate::context::Context;
use crate::error::{finalizer_err, requeue_after, Error};

const FINALIZER: &str = "nauth.io/account";
const FIELD_MANAGER: &str = "nauth-controller";
const DEFAULT_REQUEUE: Duration = Duration::from_secs(5 * 60);

async fn patch_labels(api: &Api<Account>, name: &str, labels: BTreeMap<String, String>) -> Result<(), Error> {
    let patch = serde_json::json!({
        "apiVersion": "nauth.io/v1alpha1",
        "kind": "Account",
        "metadata": { "labels": labels },
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch))
        .await?;
    Ok(())
}

async fn patch_status(api: &Api<Account>, name: &str, status: &AccountStatus) -> Result<(), Error> {
    let patch = serde_json::json!({
        "apiVersion": "nauth.io/v1alpha1",
        "kind": "Account",
        "status": status,
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch))
        .await?;
    Ok(())
}

/// Only `"System"` cluster references carry a periodic-sync interval
/// (spec.md §4.7 step 2); native references keep the default requeue.
async fn resolve_reconcile_interval(client: &Client, cluster_ref: Option<&ClusterRef>, namespace: &str) -> Duration {
    let Some(cluster_ref) = cluster_ref else {
        return DEFAULT_REQUEUE;
    };
    if cluster_ref.kind != "System" {
        return DEFAULT_REQUEUE;
    }
    let ns = cluster_ref.namespace.as_deref().unwrap_or(namespace);
    let api: Api<System> = Api::namespaced(client.clone(), ns);
    match api.get_opt(&cluster_ref.name).await {
        Ok(Some(system)) => system.spec.reconcile_interval(),
        _ => DEFAULT_REQUEUE,
    }
}

async fn reconcile_apply(account: Arc<Account>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = account
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("account has no namespace".into()))?;
    let name = account.name_any();
    let api: Api<Account> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = account.metadata.generation.unwrap_or(0);
    let mut status = account.status.clone().unwrap_or_default();

    if status.observed_generation == generation && status.operator_version.as_deref() == Some(ctx.operator_version.as_str())
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

    let labels = account.metadata.labels.clone().unwrap_or_default();
    let observe_policy = is_observe_policy(&labels);
    let account_id = labels.get(LABEL_ACCOUNT_ID).cloned();
    let account_signed_by = labels.get(LABEL_ACCOUNT_SIGNED_BY).cloned();
    let reconcile_interval =
        resolve_reconcile_interval(&ctx.client, account.spec.nats_cluster_ref.as_ref(), &namespace).await;

    let provider_ctx = AccountContext {
        namespace: namespace.clone(),
        account_name: name.clone(),
        account_id: account_id.clone(),
        account_signed_by,
        observe_policy,
        spec: account.spec.clone(),
        reconcile_interval,
        owner_uid: account.metadata.uid.clone().unwrap_or_default(),
    };

    let (provider, _periodic_sync) = ctx
        .resolver
        .resolve_for_account(account.spec.nats_cluster_ref.as_ref(), &namespace, ctx.default_cluster_ref.as_deref())
        .await?;

    let outcome = if observe_policy {
        provider.import_account(&provider_ctx).await
    } else if account_id.is_none() {
        provider.create_account(&provider_ctx).await
    } else {
        provider.update_account(&provider_ctx).await
    };

    let recorder = ctx.recorder();
    match outcome {
        Ok(outcome) => {
            let mut new_labels = labels.clone();
            new_labels.insert(LABEL_ACCOUNT_ID.to_string(), outcome.account_id.clone());
            new_labels.insert(LABEL_ACCOUNT_SIGNED_BY.to_string(), outcome.account_signed_by.clone());
            patch_labels(&api, &name, new_labels).await?;

            status.observed_generation = generation;
            status.reconcile_timestamp = Some(chrono::Utc::now());
            status.operator_version = Some(ctx.operator_version.clone());
            status.claims = Some(outcome.claims.clone());
            status.account_nkey_rotated = outcome.account_nkey_rotated;
            set_condition(&mut status.conditions, TYPE_READY, ConditionStatus::True, REASON_RECONCILED, "", generation);
            patch_status(&api, &name, &status).await?;

            recorder
                .publish(
                    &Event {
                        type_: EventType::Normal,
                        reason: "Reconciled".into(),
                        note: Some(format!("account {} reconciled", outcome.account_id)),
                        action: "Reconciling".into(),
                        secondary: None,
                    },
                    &account.object_ref(&()),
                )
                .await?;

            if outcome.account_nkey_rotated {
                enqueue_dependent_users(&ctx.client, &namespace, &outcome.account_id).await?;
            }

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
                    &account.object_ref(&()),
                )
                .await;
            Err(err.into())
        }
    }
}

/// Touches a dependent user so it re-reconciles ahead of its own resync
/// interval, forcing re-issuance of credentials under the account's new key
/// (spec.md §4.9 step 9).
async fn enqueue_dependent_users(client: &Client, namespace: &str, account_id: &str) -> Result<(), Error> {
    let selector = format!("{LABEL_USER_ACCOUNT_ID}={account_id}");
    let api: Api<User> = Api::namespaced(client.clone(), namespace);
    let users = api.list(&ListParams::default().labels(&selector)).await?;
    for user in users.items {
        let Some(user_name) = user.metadata.name.clone() else { continue };
        let patch = serde_json::json!({
            "apiVersion": "nauth.io/v1alpha1",
            "kind": "User",
            "metadata": { "annotations": { "nauth.io/rotated-at": chrono::Utc::now().to_rfc3339() } },
        });
        if let Err(e) = api
            .patch(&user_name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&patch))
            .await
        {
            tracing::warn!(namespace, user = %user_name, error = %e, "failed to touch dependent user after account nkey rotation");
        }
    }
    Ok(())
}

async fn cleanup(account: Arc<Account>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = account
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("account has no namespace".into()))?;
    let name = account.name_any();
    let api: Api<Account> = Api::namespaced(ctx.client.clone(), &namespace);
    let generation = account.metadata.generation.unwrap_or(0);
    let mut status = account.status.clone().unwrap_or_default();

    set_condition(
        &mut status.conditions,
        TYPE_READY,
        ConditionStatus::False,
        REASON_RECONCILING,
        "Deleting",
        generation,
    );
    patch_status(&api, &name, &status).await?;

    let labels = account.metadata.labels.clone().unwrap_or_default();
    let account_id = labels.get(LABEL_ACCOUNT_ID).cloned();
    let observe_policy = is_observe_policy(&labels);

    if let Some(account_id) = &account_id {
        let selector = format!("{LABEL_USER_ACCOUNT_ID}={account_id}");
        let users_api: Api<User> = Api::namespaced(ctx.client.clone(), &namespace);
        let users = users_api.list(&ListParams::default().labels(&selector)).await?;
        if !users.items.is_empty() {
            return Err(ProviderError::Conflict(format!(
                "cannot delete an account with associated users, found {} users",
                users.items.len()
            ))
            .into());
        }
    }

    if !observe_policy {
        let (provider, _) = ctx
            .resolver
            .resolve_for_account(account.spec.nats_cluster_ref.as_ref(), &namespace, ctx.default_cluster_ref.as_deref())
            .await?;
        let provider_ctx = AccountContext {
            namespace: namespace.clone(),
            account_name: name.clone(),
            account_id,
            account_signed_by: labels.get(LABEL_ACCOUNT_SIGNED_BY).cloned(),
            observe_policy,
            spec: account.spec.clone(),
            reconcile_interval: DEFAULT_REQUEUE,
            owner_uid: account.metadata.uid.clone().unwrap_or_default(),
        };
        provider.delete_account(&provider_ctx).await?;
    }

    ctx.recorder()
        .publish(
            &Event {
                type_: EventType::Normal,
                reason: "Deleted".into(),
                note: Some(format!("account {name} deleted")),
                action: "Deleting".into(),
                secondary: None,
            },
            &account.object_ref(&()),
        )
        .await?;

    Ok(Action::await_change())
}

async fn reconcile(account: Arc<Account>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = account
        .namespace()
        .ok_or_else(|| Error::InvalidSpec("account has no namespace".into()))?;
    let api: Api<Account> = Api::namespaced(ctx.client.clone(), &namespace);
    finalizer(&api, FINALIZER, account, |event| async {
        match event {
            FinalizerEvent::Apply(account) => reconcile_apply(account, ctx.clone()).await,
            FinalizerEvent::Cleanup(account) => cleanup(account, ctx.clone()).await,
        }
    })
    .await
    .map_err(finalizer_err)
}

fn error_policy(account: Arc<Account>, err: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(account = %account.name_any(), error = %err, "account reconcile failed");
    requeue_after(err)
}

/// Runs the Account controller to completion (spec.md §4.9 "MaxConcurrentReconciles is 1").
pub async fn run(client: Client, ctx: Arc<Context>) {
    let accounts = Api::<Account>::all(client);
    Controller::new(accounts, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .filter_map(|res| async move { res.ok() })
        .for_each(|_| futures::future::ready(()))
        .await;
}
