//! Tiered-limit single-selection arbitration (spec.md §4.7 "Tiered-limit
//! arbitration"): for a given account, exactly one referencing `TieredLimit`
//! is "selected"; ties break deterministically.

use kube::api::{Patch, PatchParams};
use kube::Api;

use nauth_types::tiered_limit::{SelectedForAccount, TieredLimit};

const FIELD_MANAGER: &str = "nauth-controller";

fn references(tl: &TieredLimit, account_name: &str, account_namespace: &str) -> bool {
    if tl.spec.account_ref.name != account_name {
        return false;
    }
    let ref_ns = tl
        .spec
        .account_ref
        .namespace
        .as_deref()
        .unwrap_or(account_namespace);
    ref_ns == account_namespace
}

/// Picks the oldest by `creationTimestamp`, tie-breaking on lexicographic
/// `namespace/name`.
fn oldest(candidates: &[TieredLimit]) -> &TieredLimit {
    candidates
        .iter()
        .min_by(|a, b| {
            let ts_a = a.metadata.creation_timestamp.as_ref().map(|t| t.0);
            let ts_b = b.metadata.creation_timestamp.as_ref().map(|t| t.0);
            ts_a.cmp(&ts_b).then_with(|| {
                let key_a = format!("{}/{}", a.metadata.namespace.as_deref().unwrap_or(""), a.metadata.name.as_deref().unwrap_or(""));
                let key_b = format!("{}/{}", b.metadata.namespace.as_deref().unwrap_or(""), b.metadata.name.as_deref().unwrap_or(""));
                key_a.cmp(&key_b)
            })
        })
        .expect("candidates is non-empty")
}

/// Selects (and patches status on) the TieredLimit to apply for an account,
/// returning its spec if one was selected.
pub async fn select_for_account(
    api: &Api<TieredLimit>,
    account_name: &str,
    account_namespace: &str,
) -> kube::Result<Option<TieredLimit>> {
    let all = api.list(&Default::default()).await?;
    let candidates: Vec<TieredLimit> = all
        .items
        .into_iter()
        .filter(|tl| references(tl, account_name, account_namespace))
        .collect();

    match candidates.len() {
        0 => Ok(None),
        1 => {
            let only = &candidates[0];
            if !only.status.as_ref().is_some_and(|s| s.selects(account_name, account_namespace)) {
                mark_selected(api, only, account_name, account_namespace).await?;
            }
            Ok(Some(only.clone()))
        }
        _ => {
            let already_selected: Vec<&TieredLimit> = candidates
                .iter()
                .filter(|tl| tl.status.as_ref().is_some_and(|s| s.selects(account_name, account_namespace)))
                .collect();

            let chosen = if already_selected.len() == 1 {
                already_selected[0].clone()
            } else {
                oldest(&candidates).clone()
            };

            for tl in &candidates {
                let name = tl.metadata.name.clone().unwrap_or_default();
                let chosen_name = chosen.metadata.name.clone().unwrap_or_default();
                let currently_selects = tl.status.as_ref().is_some_and(|s| s.selects(account_name, account_namespace));
                if name == chosen_name {
                    if !currently_selects {
                        mark_selected(api, tl, account_name, account_namespace).await?;
                    }
                } else if currently_selects {
                    clear_selected(api, tl).await?;
                }
            }

            Ok(Some(chosen))
        }
    }
}

async fn mark_selected(
    api: &Api<TieredLimit>,
    tl: &TieredLimit,
    account_name: &str,
    account_namespace: &str,
) -> kube::Result<()> {
    let name = tl.metadata.name.as_deref().unwrap_or_default();
    let patch = serde_json::json!({
        "apiVersion": "nauth.io/v1alpha1",
        "kind": "TieredLimit",
        "status": {
            "selectedForAccount": SelectedForAccount {
                name: account_name.to_string(),
                namespace: account_namespace.to_string(),
            }
        }
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&patch))
        .await?;
    Ok(())
}

async fn clear_selected(api: &Api<TieredLimit>, tl: &TieredLimit) -> kube::Result<()> {
    let name = tl.metadata.name.as_deref().unwrap_or_default();
    let patch = serde_json::json!({
        "apiVersion": "nauth.io/v1alpha1",
        "kind": "TieredLimit",
        "status": { "selectedForAccount": null }
    });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Apply(&patch))
        .await?;
    Ok(())
}
