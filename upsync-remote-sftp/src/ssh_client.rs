use russh::client::Handler;
use russh::keys::PublicKeyBase64;
use tracing::{info, warn};

pub(crate) struct Client {
    /// OpenSSH SHA256 fingerprints or raw base64 keys. `None` trusts every key.
    pub allowed_fingerprints: Option<Vec<String>>,
}

impl Handler for Client {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fp_sha256 = server_public_key
            .fingerprint(russh::keys::HashAlg::Sha256)
            .to_string();
        match &self.allowed_fingerprints {
            Some(allowed) => {
                let key_b64 = server_public_key.public_key_base64();
                let ok = is_allowed(allowed, &[fp_sha256.as_str(), key_b64.as_str()]);
                if !ok {
                    warn!("server key {fp_sha256} is not in the allowed fingerprints");
                }
                Ok(ok)
            }
            None => {
                info!("accepting server key {fp_sha256} without verification");
                Ok(true)
            }
        }
    }
}

fn is_allowed(allowed: &[String], candidates: &[&str]) -> bool {
    allowed
        .iter()
        .map(|s| s.trim())
        .any(|s| candidates.contains(&s))
}
