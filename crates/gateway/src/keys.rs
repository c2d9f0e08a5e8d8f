//! First-start key material (§4.K): API secret, TLS certificate, and the
//! `analytics/` directory config/secret/reset files live under.

use std::path::{Path, PathBuf};

use anyhow::Context;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use time::{Duration, OffsetDateTime};

const CERT_VALIDITY_DAYS: i64 = 365;
const CERT_RENEW_BEFORE_DAYS: i64 = 30;

/// `${claude_dir}/analytics` — where config, secret, and reset state live.
pub fn analytics_dir(claude_dir: &Path) -> PathBuf {
    claude_dir.join("analytics")
}

/// Create `analytics_dir` with mode 0700 if it doesn't already exist.
pub fn ensure_analytics_dir(claude_dir: &Path) -> anyhow::Result<PathBuf> {
    let dir = analytics_dir(claude_dir);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("chmod 0700 {}", dir.display()))?;
    }
    Ok(dir)
}

/// Load the API key at `api_key_path` (relative to `analytics_dir`),
/// generating one if absent, and return its SHA-256 hash for constant-time
/// comparison in the auth middleware.
pub fn load_or_generate_api_key_hash(analytics_dir: &Path, api_key_path: &Path) -> anyhow::Result<Vec<u8>> {
    use sha2::{Digest, Sha256};

    let path = analytics_dir.join(api_key_path);
    if !path.exists() {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        let hex_key = hex::encode(bytes);
        write_secret(&path, hex_key.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "generated API key");
    }

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Sha256::digest(raw.trim().as_bytes()).to_vec())
}

/// Load or regenerate the self-signed TLS certificate pair under
/// `${cert_path}`/`${key_path}` (§4.K — one-year ECDSA P-256 cert with DNS
/// SAN `localhost` and IP SANs `{127.0.0.1, ::1}`; warns inside 30 days of
/// expiry). `rcgen`'s ergonomic key generation targets ECDSA rather than
/// RSA 2048 — see DESIGN.md for the substitution rationale.
pub fn ensure_tls_cert(cert_path: &Path, key_path: &Path) -> anyhow::Result<()> {
    let needs_generate = !cert_path.exists() || !key_path.exists() || cert_is_expiring_soon(cert_path);
    if !needs_generate {
        return Ok(());
    }

    if let Some(parent) = cert_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let key_pair = KeyPair::generate().context("generating ECDSA P-256 key pair")?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "conductor");

    let now = OffsetDateTime::now_utc();
    let mut params = CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ])
    .context("building certificate params")?;
    params.not_before = now;
    params.not_after = now + Duration::days(CERT_VALIDITY_DAYS);
    params.distinguished_name = dn;

    let cert = params
        .self_signed(&key_pair)
        .context("generating self-signed certificate")?;

    std::fs::write(cert_path, cert.pem()).with_context(|| format!("writing {}", cert_path.display()))?;
    write_secret(key_path, key_pair.serialize_pem().as_bytes())
        .with_context(|| format!("writing {}", key_path.display()))?;

    tracing::info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "generated self-signed TLS certificate (365-day validity)"
    );
    Ok(())
}

fn cert_is_expiring_soon(cert_path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(cert_path) else {
        return true;
    };
    let Ok(modified) = meta.modified() else {
        return true;
    };
    let age_days = modified.elapsed().unwrap_or_default().as_secs() as i64 / 86400;
    let days_left = CERT_VALIDITY_DAYS - age_days;
    if days_left < CERT_RENEW_BEFORE_DAYS && days_left >= 0 {
        tracing::warn!(days_left, "TLS certificate nearing expiry");
    }
    days_left < CERT_RENEW_BEFORE_DAYS
}

fn write_secret(path: &Path, data: &[u8]) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        f.write_all(data)
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_api_key_once_and_reuses_it() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = ensure_analytics_dir(dir.path()).unwrap();
        let path = Path::new(".secret");
        let first = load_or_generate_api_key_hash(&analytics, path).unwrap();
        let second = load_or_generate_api_key_hash(&analytics, path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn generates_tls_cert_and_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("server.crt");
        let key = dir.path().join("server.key");
        ensure_tls_cert(&cert, &key).unwrap();
        assert!(cert.exists());
        assert!(key.exists());
    }

    #[test]
    #[cfg(unix)]
    fn secret_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let analytics = ensure_analytics_dir(dir.path()).unwrap();
        load_or_generate_api_key_hash(&analytics, Path::new(".secret")).unwrap();
        let meta = std::fs::metadata(analytics.join(".secret")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
