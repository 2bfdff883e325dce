//! Native (NKey + NATS JWT) claims payloads and desired-state conversion
//! (spec.md §4.1, §4.4, §4.5).
//!
//! The JWT envelope (header, `iat`/`jti` stamping, ed25519 signing and
//! verification) is entirely handled by [`nats_jwt_rs::Claims`], a direct
//! port of `nats.go`'s `jwt` package and already a teacher dependency; this
//! module only defines the `nats` claim payload (`T` in `Claims<T>`) and the
//! pure functions that build one from, or project one back into, our own
//! desired-state types. Per spec.md §1 the JWT codec itself is an assumed
//! library service, not something this module reimplements.

use std::collections::BTreeMap;

use nats_jwt_rs::{Claim, Claims};
use nkeys::KeyPair;
use serde::{Deserialize, Serialize};

use nauth_types::account::{
    AccountLimits, AccountSpec, Export, Import, ImportAccountRef, JetStreamLimits, Limit,
    NatsLimits,
};
use nauth_types::user::{Permissions, UserLimits, UserSpec};
use nauth_types::value::StringList;

/// Defaults per spec.md §4.1's "Native default" column: nil fields stay
/// `-1`/unlimited (NATS convention), except `wildcards` which defaults `true`.
fn native_default(value: Option<Limit>) -> Limit {
    value.unwrap_or(-1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountLimitsJwt {
    pub subs: Limit,
    pub data: Limit,
    pub payload: Limit,
    pub imports: Limit,
    pub exports: Limit,
    pub wildcards: bool,
    pub conn: Limit,
    pub leaf: Limit,
    pub mem_storage: Limit,
    pub disk_storage: Limit,
    pub streams: Limit,
    pub consumer: Limit,
    pub max_ack_pending: Limit,
    pub mem_max_stream_bytes: Limit,
    pub disk_max_stream_bytes: Limit,
    pub max_bytes_required: bool,
}

impl AccountLimitsJwt {
    fn from_spec(nats: &NatsLimits, account: &AccountLimits, js: &JetStreamLimits) -> Self {
        Self {
            subs: native_default(nats.subs),
            data: native_default(nats.data),
            payload: native_default(nats.payload),
            imports: native_default(account.imports),
            exports: native_default(account.exports),
            wildcards: account.wildcards.unwrap_or(true),
            conn: native_default(account.conn),
            leaf: native_default(account.leaf),
            mem_storage: native_default(js.mem_storage),
            disk_storage: native_default(js.disk_storage),
            streams: native_default(js.streams),
            consumer: native_default(js.consumer),
            max_ack_pending: native_default(js.max_ack_pending),
            mem_max_stream_bytes: native_default(js.mem_max_stream_bytes),
            disk_max_stream_bytes: native_default(js.disk_max_stream_bytes),
            max_bytes_required: js.max_bytes_required.unwrap_or(false),
        }
    }

    fn into_spec(self) -> (NatsLimits, AccountLimits, JetStreamLimits) {
        (
            NatsLimits {
                subs: Some(self.subs),
                data: Some(self.data),
                payload: Some(self.payload),
            },
            AccountLimits {
                imports: Some(self.imports),
                exports: Some(self.exports),
                wildcards: Some(self.wildcards),
                conn: Some(self.conn),
                leaf: Some(self.leaf),
            },
            JetStreamLimits {
                mem_storage: Some(self.mem_storage),
                disk_storage: Some(self.disk_storage),
                streams: Some(self.streams),
                consumer: Some(self.consumer),
                max_ack_pending: Some(self.max_ack_pending),
                mem_max_stream_bytes: Some(self.mem_max_stream_bytes),
                disk_max_stream_bytes: Some(self.disk_max_stream_bytes),
                max_bytes_required: Some(self.max_bytes_required),
            },
        )
    }
}

/// A signing key that has been delegated scope: a template permission/limit
/// set constraining any user signed by it (spec.md §4.5 "scoped signer").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopedSigner {
    pub key: String,
    #[serde(default)]
    pub template: UserScope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserScope {
    #[serde(default)]
    pub permissions: Option<Permissions>,
    #[serde(default)]
    pub limits: Option<UserLimits>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountClaimsBody {
    pub limits: AccountLimitsJwt,
    #[serde(default)]
    pub signing_keys: StringList,
    #[serde(default)]
    pub signer_scopes: Vec<ScopedSigner>,
    #[serde(default)]
    pub exports: Vec<Export>,
    #[serde(default)]
    pub imports: Vec<ResolvedImport>,
    #[serde(rename = "type")]
    pub claim_type: String,
}

impl Claim for AccountClaimsBody {
    fn validate() {}
}

/// An [`Import`] with `accountRef` resolved to the referenced account's
/// public key (spec.md §4.4 step 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedImport {
    pub name: String,
    pub account: String,
    pub subject: String,
    #[serde(default)]
    pub local_subject: Option<String>,
    #[serde(rename = "type")]
    pub import_type: nauth_types::account::ExportType,
    #[serde(default)]
    pub share: bool,
    #[serde(default)]
    pub allow_trace: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NativeClaimsError {
    #[error("account id for import target {0:?} not found (account-id label absent)")]
    ImportTargetUnresolved(String),
    #[error("conflicting import subject found: {0}")]
    ConflictingImportSubject(String),
    #[error("jwt decode error: {0}")]
    Decode(#[from] anyhow::Error),
}

/// Builds and signs an account JWT (spec.md §4.4 step 2–3).
///
/// `resolve_account_id` maps an [`ImportAccountRef`] to the remote account's
/// `account-id` label; it is fatal (per spec.md) if absent.
pub fn build_account_claims(
    spec: &AccountSpec,
    account_key: &KeyPair,
    signing_key: &KeyPair,
    resolve_account_id: impl Fn(&ImportAccountRef) -> Option<String>,
) -> Result<Claims<AccountClaimsBody>, NativeClaimsError> {
    if let Some(subject) = spec.conflicting_import_subject() {
        return Err(NativeClaimsError::ConflictingImportSubject(
            subject.to_string(),
        ));
    }

    let mut imports = Vec::with_capacity(spec.imports.len());
    for import in &spec.imports {
        let account = resolve_account_id(&import.account_ref).ok_or_else(|| {
            NativeClaimsError::ImportTargetUnresolved(import.account_ref.name.clone())
        })?;
        imports.push(ResolvedImport {
            name: import.name.clone(),
            account,
            subject: import.subject.clone(),
            local_subject: import.local_subject.clone(),
            import_type: import.import_type,
            share: import.share,
            allow_trace: import.allow_trace,
        });
    }

    let mut signing_keys = StringList::new();
    signing_keys.add(signing_key.public_key());

    let body = AccountClaimsBody {
        limits: AccountLimitsJwt::from_spec(
            &spec.nats_limits,
            &spec.account_limits,
            &spec.jet_stream_limits,
        ),
        signing_keys,
        signer_scopes: Vec::new(),
        exports: spec.exports.clone(),
        imports,
        claim_type: "account".to_string(),
    };

    let mut claims = blank_claims(body, account_key.public_key());
    claims.name = spec.display_name.clone();
    Ok(claims)
}

/// Signs previously built claims with the operator (or account signing) key,
/// returning the encoded JWT string.
pub fn sign_account_claims(
    claims: &Claims<AccountClaimsBody>,
    signer: &KeyPair,
) -> anyhow::Result<String> {
    claims.encode(signer)
}

/// Decodes and verifies an account JWT (spec.md §4.4 "Import (observe)").
pub fn decode_account_claims(jwt: &str) -> anyhow::Result<Claims<AccountClaimsBody>> {
    Claims::<AccountClaimsBody>::decode(jwt)
}

/// Projects decoded account claims back into desired-state shape
/// (spec.md §4.4 "Import"; round-trip law in spec.md §8).
pub fn project_account(claims: &Claims<AccountClaimsBody>) -> AccountSpec {
    let (nats_limits, account_limits, jet_stream_limits) = claims.nats.limits.clone().into_spec();
    let imports = claims
        .nats
        .imports
        .iter()
        .map(|ri| Import {
            name: ri.name.clone(),
            account_ref: ImportAccountRef {
                name: ri.account.clone(),
                namespace: None,
            },
            subject: ri.subject.clone(),
            local_subject: ri.local_subject.clone(),
            import_type: ri.import_type,
            share: ri.share,
            allow_trace: ri.allow_trace,
        })
        .collect();

    AccountSpec {
        display_name: claims.name.clone(),
        nats_cluster_ref: None,
        nats_limits,
        account_limits,
        jet_stream_limits,
        exports: claims.nats.exports.clone(),
        imports,
    }
}

/// User limits embedded directly in the user JWT for direct (non-scoped)
/// issuance, or in the account's `signer_scopes` template for scoped
/// issuance (spec.md §4.5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLimitsJwt {
    pub subs: Limit,
    pub data: Limit,
    pub payload: Limit,
    #[serde(default)]
    pub src: Vec<String>,
    #[serde(default)]
    pub times: Vec<nauth_types::value::TimeRange>,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserClaimsBody {
    #[serde(default)]
    pub permissions: Option<Permissions>,
    pub limits: UserLimitsJwt,
    pub issuer_account: String,
    #[serde(rename = "type")]
    pub claim_type: String,
}

impl Claim for UserClaimsBody {
    fn validate() {}
}

fn user_limits_jwt(spec: &UserSpec) -> UserLimitsJwt {
    let nats = spec.nats_limits.clone().unwrap_or_default();
    let limits = spec.limits.clone().unwrap_or_default();
    UserLimitsJwt {
        subs: native_default(nats.subs),
        data: native_default(nats.data),
        payload: native_default(nats.payload),
        src: limits.src.iter().cloned().collect(),
        times: limits.times.clone(),
        locale: limits.locale.clone(),
    }
}

/// Builds direct (unscoped) user claims, signed by the account's own signing
/// key (spec.md §4.5 step 4 "Direct").
pub fn build_direct_user_claims(
    spec: &UserSpec,
    user_key: &KeyPair,
    account_id: &str,
) -> Claims<UserClaimsBody> {
    let body = UserClaimsBody {
        permissions: spec.permissions.clone(),
        limits: user_limits_jwt(spec),
        issuer_account: account_id.to_string(),
        claim_type: "user".to_string(),
    };
    let mut claims = blank_claims(body, user_key.public_key());
    claims.name = spec.display_name.clone();
    claims
}

/// Builds scoped user claims: permissions/limits live on the account's
/// [`ScopedSigner`] template, so the embedded claims carry neither
/// (spec.md §4.5 step 4 "Scoped").
pub fn build_scoped_user_claims(
    spec: &UserSpec,
    user_key: &KeyPair,
    account_id: &str,
) -> Claims<UserClaimsBody> {
    let body = UserClaimsBody {
        permissions: None,
        limits: UserLimitsJwt::default(),
        issuer_account: account_id.to_string(),
        claim_type: "user".to_string(),
    };
    let mut claims = blank_claims(body, user_key.public_key());
    claims.name = spec.display_name.clone();
    claims
}

/// The scoped-signer entry to merge into the account's `signer_scopes`
/// (spec.md §4.5 step 4 "Scoped").
pub fn scoped_signer_for(spec: &UserSpec, scoped_key: &KeyPair) -> ScopedSigner {
    ScopedSigner {
        key: scoped_key.public_key(),
        template: UserScope {
            permissions: spec.permissions.clone(),
            limits: spec.limits.clone(),
        },
    }
}

/// Adds or replaces a [`ScopedSigner`] by public key.
pub fn upsert_scoped_signer(body: &mut AccountClaimsBody, signer: ScopedSigner) {
    body.signing_keys.add(signer.key.clone());
    if let Some(existing) = body.signer_scopes.iter_mut().find(|s| s.key == signer.key) {
        *existing = signer;
    } else {
        body.signer_scopes.push(signer);
    }
}

/// Removes a scoped signer by public key — the remove-only behavior
/// spec.md §9's Open Question directs implementers to prefer over the
/// observed add-then-immediately-remove sequence.
pub fn remove_scoped_signer(body: &mut AccountClaimsBody, key: &str) {
    body.signing_keys.remove(key);
    body.signer_scopes.retain(|s| s.key != key);
}

/// Formats a NATS creds file: JWT block then seed block (spec.md §6).
pub fn format_creds(jwt: &str, seed: &str) -> String {
    format!(
        "-----BEGIN NATS USER JWT-----\n{jwt}\n------END NATS USER JWT------\n\n\
         ************************* IMPORTANT *************************\n\
         NKEY Seed printed below can be used to sign and prove identity.\n\
         NKEYs are sensitive and should be treated as secrets.\n\n\
         -----BEGIN USER NKEY SEED-----\n{seed}\n------END USER NKEY SEED------\n\n\
         *************************************************************\n"
    )
}

/// Builds a fresh [`Claims`] envelope around `nats` for `sub`. `iat`/`jti`/
/// `iss` are overwritten by [`Claims::encode`] at signing time, so they are
/// left blank here; every field on [`Claims`] is public, so this is a plain
/// struct literal rather than a constructor the upstream crate provides.
fn blank_claims<T: Claim>(nats: T, sub: impl Into<String>) -> Claims<T> {
    Claims {
        aud: None,
        exp: None,
        iat: 0,
        id: None,
        iss: String::new(),
        jti: String::new(),
        name: None,
        nats,
        nbf: None,
        sub: sub.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nauth_types::account::AccountLimits;

    fn spec_with_imports(imports: Vec<Import>) -> AccountSpec {
        AccountSpec {
            display_name: Some("acct".into()),
            nats_cluster_ref: None,
            nats_limits: NatsLimits::default(),
            account_limits: AccountLimits::default(),
            jet_stream_limits: JetStreamLimits::default(),
            exports: vec![],
            imports,
        }
    }

    #[test]
    fn build_then_sign_then_decode_round_trips() {
        let operator = KeyPair::new_operator();
        let account = KeyPair::new_account();
        let signing = KeyPair::new_account();

        let claims = build_account_claims(&spec_with_imports(vec![]), &account, &signing, |_| None)
            .unwrap();
        let jwt = sign_account_claims(&claims, &operator).unwrap();
        let decoded = decode_account_claims(&jwt).unwrap();
        assert_eq!(decoded.sub, account.public_key());
        assert_eq!(decoded.iss, operator.public_key());

        let projected = project_account(&decoded);
        assert_eq!(projected.nats_limits.subs, Some(-1));
    }

    #[test]
    fn conflicting_import_subjects_are_rejected() {
        let a = Import {
            name: "a".into(),
            account_ref: ImportAccountRef { name: "x".into(), namespace: None },
            subject: "a.>".into(),
            local_subject: None,
            import_type: nauth_types::account::ExportType::Stream,
            share: false,
            allow_trace: false,
        };
        let b = Import { name: "b".into(), subject: "a.>".into(), ..a.clone() };
        let account = KeyPair::new_account();
        let signing = KeyPair::new_account();
        let err = build_account_claims(&spec_with_imports(vec![a, b]), &account, &signing, |_| {
            Some("ATARGET".into())
        })
        .unwrap_err();
        assert!(matches!(err, NativeClaimsError::ConflictingImportSubject(_)));
    }

    #[test]
    fn unresolved_import_target_is_fatal() {
        let a = Import {
            name: "a".into(),
            account_ref: ImportAccountRef { name: "x".into(), namespace: None },
            subject: "a.>".into(),
            local_subject: None,
            import_type: nauth_types::account::ExportType::Stream,
            share: false,
            allow_trace: false,
        };
        let account = KeyPair::new_account();
        let signing = KeyPair::new_account();
        let err = build_account_claims(&spec_with_imports(vec![a]), &account, &signing, |_| None)
            .unwrap_err();
        assert!(matches!(err, NativeClaimsError::ImportTargetUnresolved(_)));
    }

    #[test]
    fn unlimited_subs_is_minus_one_in_encoded_jwt() {
        let account = KeyPair::new_user();
        let spec = UserSpec {
            account_name: "acct".into(),
            display_name: None,
            permissions: None,
            limits: None,
            nats_limits: None,
            use_signing_key: false,
        };
        let claims = build_direct_user_claims(&spec, &account, "ACCOUNTID");
        assert_eq!(claims.nats.limits.subs, -1);
    }

    #[test]
    fn scoped_signer_add_then_remove_leaves_no_trace() {
        let mut body = AccountClaimsBody::default();
        let key = KeyPair::new_account();
        let scoped = ScopedSigner { key: key.public_key(), template: UserScope::default() };
        upsert_scoped_signer(&mut body, scoped);
        assert_eq!(body.signer_scopes.len(), 1);
        remove_scoped_signer(&mut body, &key.public_key());
        assert!(body.signer_scopes.is_empty());
        assert!(!body.signing_keys.contains(&key.public_key()));
    }
}
