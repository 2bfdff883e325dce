//! Hosted (Synadia Cloud REST) claims payloads and desired-state conversion
//! (spec.md §4.1, §4.6).
//!
//! The wire shape itself — route paths, HTTP verbs, auth — is
//! `nauth-hosted`'s concern; this module only owns the `jwt_settings` DTO and
//! the `desired → DTO` limit-mapping rules, which are shared by account
//! create, update, and drift comparison.

use serde::{Deserialize, Serialize};

use nauth_types::account::{AccountLimits, JetStreamLimits, Limit, NatsLimits};
use nauth_types::tiered_limit::Tier;
use nauth_types::user::{Permissions, UserSpec};
use nauth_types::value::{CidrList, TimeRange};

/// Core NATS limits as carried under `jwt_settings.limits` (spec.md §4.6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NatsLimitsDto {
    pub subs: Limit,
    pub data: Limit,
    pub payload: Limit,
    pub conn: Limit,
    pub leaf: Limit,
    pub imports: Limit,
    pub exports: Limit,
    pub wildcards: bool,
}

/// A single replication tier under `jwt_settings.tiered_limits.{R1,R3}`.
///
/// Fields are never `#[serde(skip_serializing_if)]`: spec.md §4.6 requires
/// that clearing a tier PATCH an explicit `null`, not omit the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierDto {
    pub disk_storage: Limit,
    pub disk_max_stream_bytes: Limit,
    pub streams: Limit,
    pub consumer: Limit,
    pub max_ack_pending: Limit,
    pub max_bytes_required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TieredLimitsDto {
    pub r1: Option<TierDto>,
    pub r3: Option<TierDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtSettingsDto {
    pub limits: NatsLimitsDto,
    pub tiered_limits: TieredLimitsDto,
}

/// Hosted defaults per spec.md §4.1's "Hosted default" column, applied to
/// nil/unlimited (`-1`) desired-state fields.
fn hosted_default(value: Option<Limit>, default: Limit) -> Limit {
    match value {
        None | Some(-1) => default,
        Some(v) => v,
    }
}

/// `conn` is additionally coerced to `>= 1` after defaulting (spec.md §4.6).
fn hosted_conn(value: Option<Limit>) -> Limit {
    hosted_default(value, 1).max(1)
}

pub fn nats_limits_to_dto(nats: &NatsLimits, account: &AccountLimits) -> NatsLimitsDto {
    NatsLimitsDto {
        subs: hosted_default(nats.subs, 1),
        data: hosted_default(nats.data, -1),
        payload: hosted_default(nats.payload, 1024 * 1024),
        conn: hosted_conn(account.conn),
        leaf: hosted_default(account.leaf, 0),
        imports: hosted_default(account.imports, -1),
        exports: hosted_default(account.exports, -1),
        wildcards: account.wildcards.unwrap_or(true),
    }
}

/// Maps a single tier: `-1 -> 0` for limited fields, `maxAckPending`
/// `nil | -1 -> -1` (it is the one tier field that keeps `-1` as its
/// "unlimited" sentinel rather than remapping to `0`).
fn tier_to_dto(tier: &Tier) -> TierDto {
    TierDto {
        disk_storage: tier_limited_field(tier.disk_storage),
        disk_max_stream_bytes: tier_limited_field(tier.disk_max_stream_bytes),
        streams: tier_limited_field(tier.streams),
        consumer: tier_limited_field(tier.consumer),
        max_ack_pending: match tier.max_ack_pending {
            None | Some(-1) => -1,
            Some(v) => v,
        },
        max_bytes_required: tier.max_bytes_required.unwrap_or(true),
    }
}

fn tier_limited_field(value: Option<Limit>) -> Limit {
    match value {
        None | Some(-1) => 0,
        Some(v) => v,
    }
}

pub fn tiered_limits_to_dto(r1: Option<&Tier>, r3: Option<&Tier>) -> TieredLimitsDto {
    TieredLimitsDto {
        r1: r1.map(tier_to_dto),
        r3: r3.map(tier_to_dto),
    }
}

pub fn jwt_settings_dto(
    nats: &NatsLimits,
    account: &AccountLimits,
    _js: &JetStreamLimits,
    r1: Option<&Tier>,
    r3: Option<&Tier>,
) -> JwtSettingsDto {
    JwtSettingsDto {
        limits: nats_limits_to_dto(nats, account),
        tiered_limits: tiered_limits_to_dto(r1, r3),
    }
}

/// Compares the remote account's reported limits against what we would send
/// for the current desired state (spec.md §4.7 step 4 "Compute drift").
///
/// `JetStreamLimits`'s non-tiered fields (`mem_storage`, `mem_max_stream_bytes`)
/// have no hosted counterpart — the hosted API only models per-tier disk/stream
/// quotas — so only `nats_limits`/`account_limits`/the resolved tier pair
/// participate in equality.
pub fn limits_equal(remote: &JwtSettingsDto, desired: &JwtSettingsDto) -> bool {
    remote == desired
}

/// A user's `jwt_settings` DTO: the hosted equivalent of the native
/// per-user limits + permissions embedded directly in the user JWT
/// (spec.md §4.6 "User create-or-update" — PATCHed in full every time, no
/// drift shortcut, since permissions are authoritative).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserLimitsDto {
    pub subs: Limit,
    pub data: Limit,
    pub payload: Limit,
    pub src: Vec<String>,
    pub times: Vec<TimeRange>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserJwtSettingsDto {
    pub permissions: Option<Permissions>,
    pub limits: UserLimitsDto,
}

pub fn user_jwt_settings_dto(spec: &UserSpec) -> UserJwtSettingsDto {
    let nats = spec.nats_limits.clone().unwrap_or_default();
    let limits = spec.limits.clone().unwrap_or_default();
    UserJwtSettingsDto {
        permissions: spec.permissions.clone(),
        limits: UserLimitsDto {
            subs: hosted_default(nats.subs, 1),
            data: hosted_default(nats.data, -1),
            payload: hosted_default(nats.payload, 1024 * 1024),
            src: limits.src.iter().cloned().collect(),
            times: limits.times.clone(),
            locale: limits.locale.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_subs_defaults_to_one_not_unlimited() {
        let dto = nats_limits_to_dto(&NatsLimits::default(), &AccountLimits::default());
        assert_eq!(dto.subs, 1);
        assert_eq!(dto.data, -1);
        assert_eq!(dto.payload, 1024 * 1024);
    }

    #[test]
    fn conn_is_coerced_to_at_least_one() {
        let account = AccountLimits {
            conn: Some(0),
            ..Default::default()
        };
        let dto = nats_limits_to_dto(&NatsLimits::default(), &account);
        assert_eq!(dto.conn, 1);
    }

    #[test]
    fn unlimited_conn_still_coerced_to_one() {
        let account = AccountLimits {
            conn: Some(-1),
            ..Default::default()
        };
        let dto = nats_limits_to_dto(&NatsLimits::default(), &account);
        assert_eq!(dto.conn, 1);
    }

    #[test]
    fn tier_limited_fields_remap_unlimited_to_zero() {
        let tier = Tier {
            streams: Some(-1),
            max_ack_pending: Some(-1),
            ..Default::default()
        };
        let dto = tier_to_dto(&tier);
        assert_eq!(dto.streams, 0);
        assert_eq!(dto.max_ack_pending, -1);
    }

    #[test]
    fn absent_tier_serializes_as_explicit_null() {
        let dto = tiered_limits_to_dto(None, None);
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("r1").unwrap().is_null());
        assert!(json.get("r3").unwrap().is_null());
    }
}
