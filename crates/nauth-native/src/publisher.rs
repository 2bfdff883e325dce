//! The NATS wire-protocol client contract (spec.md §6 "NATS client
//! surface"). The client itself is an external collaborator — only the
//! trait boundary lives here, so the account engine can be exercised
//! against a mock without a running NATS server.

use async_trait::async_trait;

#[async_trait]
pub trait NatsPublisher: Send + Sync {
    /// Establishes (or reuses) a connection scoped to `namespace`'s
    /// configured cluster. Bracketed around a single publish; the
    /// connection is not held across reconciles (spec.md §5).
    async fn ensure_connected(&self, namespace: &str) -> anyhow::Result<()>;

    async fn disconnect(&self);

    async fn lookup_account_jwt(&self, account_id: &str) -> anyhow::Result<String>;

    async fn upload_account_jwt(&self, jwt: &str) -> anyhow::Result<()>;

    async fn delete_account_jwt(&self, account_id: &str) -> anyhow::Result<()>;
}

/// Subjects of nats-server's NATS-based account resolver (`resolver: { type: full }`),
/// used to push and pull account JWTs without a filesystem-shared resolver
/// directory (spec.md §6 "NATS client surface").
mod subjects {
    pub const CLAIMS_UPDATE: &str = "$SYS.REQ.CLAIMS.UPDATE";
    pub fn claims_lookup(account_id: &str) -> String {
        format!("$SYS.REQ.ACCOUNT.{account_id}.CLAIMS.LOOKUP")
    }
    pub const CLAIMS_DELETE: &str = "$SYS.REQ.CLAIMS.DELETE";
}

/// Connects to the cluster's NATS system account on demand and round-trips
/// account JWTs through the resolver's request/reply subjects.
pub struct AsyncNatsPublisher {
    url: String,
    creds: String,
    client: tokio::sync::Mutex<Option<async_nats::Client>>,
}

impl AsyncNatsPublisher {
    pub fn new(url: impl Into<String>, creds: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            creds: creds.into(),
            client: tokio::sync::Mutex::new(None),
        }
    }

    async fn client(&self) -> anyhow::Result<async_nats::Client> {
        let guard = self.client.lock().await;
        guard
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("not connected"))
    }
}

#[async_trait]
impl NatsPublisher for AsyncNatsPublisher {
    async fn ensure_connected(&self, _namespace: &str) -> anyhow::Result<()> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let opts = async_nats::ConnectOptions::new().credentials(&self.creds)?;
        let client = opts.connect(&self.url).await?;
        *guard = Some(client);
        Ok(())
    }

    async fn disconnect(&self) {
        self.client.lock().await.take();
    }

    async fn lookup_account_jwt(&self, account_id: &str) -> anyhow::Result<String> {
        let client = self.client().await?;
        let reply = client.request(subjects::claims_lookup(account_id), Vec::new().into()).await?;
        Ok(String::from_utf8(reply.payload.to_vec())?)
    }

    async fn upload_account_jwt(&self, jwt: &str) -> anyhow::Result<()> {
        let client = self.client().await?;
        client.publish(subjects::CLAIMS_UPDATE, jwt.to_string().into()).await?;
        client.flush().await?;
        Ok(())
    }

    async fn delete_account_jwt(&self, account_id: &str) -> anyhow::Result<()> {
        let client = self.client().await?;
        client.publish(subjects::CLAIMS_DELETE, account_id.to_string().into()).await?;
        client.flush().await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::NatsPublisher;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for a NATS system-account JWT API, keyed by
    /// account public key.
    #[derive(Default)]
    pub struct MockPublisher {
        pub jwts: Mutex<HashMap<String, String>>,
        pub upload_calls: Mutex<u32>,
        pub fail_upload: bool,
    }

    #[async_trait]
    impl NatsPublisher for MockPublisher {
        async fn ensure_connected(&self, _namespace: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn disconnect(&self) {}

        async fn lookup_account_jwt(&self, account_id: &str) -> anyhow::Result<String> {
            Ok(self
                .jwts
                .lock()
                .unwrap()
                .get(account_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn upload_account_jwt(&self, jwt: &str) -> anyhow::Result<()> {
            *self.upload_calls.lock().unwrap() += 1;
            if self.fail_upload {
                anyhow::bail!("publish failed");
            }
            let claims = nats_jwt_rs::Claims::<nauth_claims::native::AccountClaimsBody>::decode(jwt)?;
            self.jwts.lock().unwrap().insert(claims.sub.clone(), jwt.to_string());
            Ok(())
        }

        async fn delete_account_jwt(&self, account_id: &str) -> anyhow::Result<()> {
            self.jwts.lock().unwrap().remove(account_id);
            Ok(())
        }
    }
}
