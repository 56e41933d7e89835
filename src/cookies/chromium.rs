//! Chromium-family cookie stores
//!
//! Chrome, Chromium, Opera, Opera GX, Brave, Edge and Vivaldi all share the
//! same storage: an SQLite `Cookies` database per profile with values in
//! `encrypted_value`. The encryption differs per OS:
//!
//! - Windows: AES-256-GCM (`v10` prefix) with a DPAPI-wrapped key kept in the
//!   `Local State` file; very old rows are raw DPAPI blobs.
//! - Linux: AES-128-CBC (`v10`/`v11` prefix), key derived with PBKDF2-HMAC-SHA1
//!   from the hardcoded `peanuts` password and `saltysalt` salt, 1 iteration.
//! - macOS: AES-128-CBC, same salt, 1003 iterations over the per-browser
//!   "Safe Storage" password held in the login keychain.
//!
//! Recent Chromium additionally prefixes the decrypted value with the SHA-256
//! of the row's host key, which has to be stripped.

use std::path::{Path, PathBuf};

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use rusqlite::{Connection, OpenFlags};
use sha2::{Digest, Sha256};

use super::{snapshot_db, Browser, CookieStoreError, RawCookie};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const CBC_SALT: &[u8] = b"saltysalt";
const CBC_IV: [u8; 16] = [0x20; 16];

pub(super) fn read(browser: Browser, domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
    let roots = user_data_roots(browser);
    let mut stores: Vec<(PathBuf, PathBuf)> = Vec::new();
    for root in roots {
        for db in find_cookie_dbs(&root) {
            stores.push((root.clone(), db));
        }
    }
    if stores.is_empty() {
        return Err(CookieStoreError::NotInstalled);
    }

    let mut cookies = Vec::new();
    let mut last_err = None;
    for (root, db) in stores {
        let decryptor = ValueDecryptor::for_browser(browser, &root);
        match read_db(&db, domain, &decryptor) {
            Ok(mut found) => cookies.append(&mut found),
            Err(err) => {
                tracing::debug!("{}: skipping {}: {err}", browser.name(), db.display());
                last_err = Some(err);
            }
        }
    }

    match (cookies.is_empty(), last_err) {
        (true, Some(err)) => Err(err),
        _ => Ok(cookies),
    }
}

/// Read one profile's cookie database through a snapshot copy
pub(super) fn read_db(
    db_path: &Path,
    domain: &str,
    decryptor: &ValueDecryptor,
) -> Result<Vec<RawCookie>, CookieStoreError> {
    let snapshot = snapshot_db(db_path)?;
    let result = query_cookies(&snapshot, domain, decryptor);
    let _ = std::fs::remove_file(&snapshot);
    result
}

fn query_cookies(
    db_path: &Path,
    domain: &str,
    decryptor: &ValueDecryptor,
) -> Result<Vec<RawCookie>, CookieStoreError> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn
        .prepare("SELECT host_key, name, value, encrypted_value FROM cookies WHERE host_key LIKE ?1")?;
    let mut rows = stmt.query([format!("%{domain}%")])?;

    let mut cookies = Vec::new();
    while let Some(row) = rows.next()? {
        let host: String = row.get(0)?;
        let name: String = row.get(1)?;
        let plain: String = row.get(2)?;
        let encrypted: Vec<u8> = row.get(3)?;

        let value = if !plain.is_empty() {
            plain
        } else if encrypted.is_empty() {
            String::new()
        } else {
            match decryptor.decrypt(&encrypted, &host) {
                Ok(value) => value,
                Err(err) => {
                    // One undecryptable row should not lose the rest
                    tracing::debug!("could not decrypt cookie '{name}' for {host}: {err}");
                    continue;
                }
            }
        };

        cookies.push(RawCookie { name, value, host });
    }

    Ok(cookies)
}

/// Per-profile decryption state, resolved once per cookie database
pub(super) struct ValueDecryptor {
    /// AES-256-GCM key from `Local State` (Windows)
    gcm_key: Option<Vec<u8>>,
    /// AES-128-CBC key derived from the store password (Linux/macOS)
    cbc_key: Option<[u8; 16]>,
}

impl ValueDecryptor {
    fn for_browser(browser: Browser, root: &Path) -> Self {
        #[cfg(windows)]
        {
            let _ = browser;
            let gcm_key = match windows_impl::local_state_key(root) {
                Ok(key) => Some(key),
                Err(err) => {
                    tracing::debug!("no Local State key under {}: {err}", root.display());
                    None
                }
            };
            return Self { gcm_key, cbc_key: None };
        }

        #[cfg(target_os = "macos")]
        {
            let _ = root;
            let cbc_key = match macos_safe_storage_password(browser) {
                Ok(password) => Some(derive_cbc_key(password.as_bytes(), 1003)),
                Err(err) => {
                    tracing::debug!("{}: keychain password unavailable: {err}", browser.name());
                    None
                }
            };
            return Self { gcm_key: None, cbc_key };
        }

        #[cfg(not(any(windows, target_os = "macos")))]
        {
            let _ = (browser, root);
            // Chromium's basic password store on Linux
            Self {
                gcm_key: None,
                cbc_key: Some(derive_cbc_key(b"peanuts", 1)),
            }
        }
    }

    /// Build a decryptor around a known CBC key
    #[cfg(test)]
    fn with_cbc_key(key: [u8; 16]) -> Self {
        Self { gcm_key: None, cbc_key: Some(key) }
    }

    fn decrypt(&self, encrypted: &[u8], host: &str) -> Result<String, CookieStoreError> {
        let versioned = encrypted.len() > 3
            && (encrypted.starts_with(b"v10") || encrypted.starts_with(b"v11"));

        let plain = if versioned {
            if let Some(key) = &self.gcm_key {
                decrypt_gcm(key, &encrypted[3..])?
            } else if let Some(key) = &self.cbc_key {
                decrypt_cbc(key, &encrypted[3..])?
            } else {
                return Err(CookieStoreError::Decrypt("no key available".into()));
            }
        } else {
            #[cfg(windows)]
            {
                windows_impl::dpapi_unprotect(encrypted)?
            }
            #[cfg(not(windows))]
            {
                return Err(CookieStoreError::Decrypt(format!(
                    "unrecognized value prefix for host {host}"
                )));
            }
        };

        Ok(String::from_utf8_lossy(strip_host_hash(&plain, host)).into_owned())
    }
}

fn decrypt_gcm(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, CookieStoreError> {
    use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};

    if payload.len() < 12 + 16 {
        return Err(CookieStoreError::Decrypt("GCM payload too short".into()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CookieStoreError::Decrypt("bad AES-256-GCM key length".into()))?;
    cipher
        .decrypt(Nonce::from_slice(&payload[..12]), &payload[12..])
        .map_err(|_| CookieStoreError::Decrypt("AES-GCM decryption failed".into()))
}

fn decrypt_cbc(key: &[u8; 16], payload: &[u8]) -> Result<Vec<u8>, CookieStoreError> {
    if payload.is_empty() || payload.len() % 16 != 0 {
        return Err(CookieStoreError::Decrypt("CBC payload not block aligned".into()));
    }
    Aes128CbcDec::new(key.into(), &CBC_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(payload)
        .map_err(|_| CookieStoreError::Decrypt("AES-CBC decryption failed".into()))
}

/// Derive the CBC store key the way Chromium's os_crypt does
fn derive_cbc_key(password: &[u8], iterations: u32) -> [u8; 16] {
    let mut key = [0u8; 16];
    pbkdf2::pbkdf2_hmac::<sha1::Sha1>(password, CBC_SALT, iterations, &mut key);
    key
}

/// Chromium >= 24 prepends SHA-256(host_key) to the decrypted value
fn strip_host_hash<'a>(plain: &'a [u8], host: &str) -> &'a [u8] {
    if plain.len() >= 32 {
        let hash = Sha256::digest(host.as_bytes());
        if plain[..32] == hash[..] {
            return &plain[32..];
        }
    }
    plain
}

/// Cookie database candidates under one user-data root: the root itself
/// (Opera), `Default`, and every `Profile N`, each with the newer
/// `Network/Cookies` relocation checked first.
fn find_cookie_dbs(root: &Path) -> Vec<PathBuf> {
    let mut profile_dirs = vec![root.to_path_buf()];
    let default = root.join("Default");
    if default.is_dir() {
        profile_dirs.push(default);
    }
    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("Profile ") && entry.path().is_dir() {
                profile_dirs.push(entry.path());
            }
        }
    }

    let mut dbs = Vec::new();
    for dir in profile_dirs {
        let network = dir.join("Network").join("Cookies");
        if network.is_file() {
            dbs.push(network);
        } else {
            let flat = dir.join("Cookies");
            if flat.is_file() {
                dbs.push(flat);
            }
        }
    }
    dbs
}

/// Installed user-data roots for a browser on this OS
fn user_data_roots(browser: Browser) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "linux")]
    {
        if let Some(config) = dirs::config_dir() {
            let rel: &[&str] = match browser {
                Browser::Chrome => &["google-chrome"],
                Browser::Chromium => &["chromium"],
                Browser::Opera => &["opera"],
                Browser::OperaGx => &[],
                Browser::Brave => &["BraveSoftware/Brave-Browser"],
                Browser::Edge => &["microsoft-edge"],
                Browser::Vivaldi => &["vivaldi"],
                _ => &[],
            };
            roots.extend(rel.iter().map(|r| config.join(r)));
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(support) = dirs::config_dir() {
            let rel: &[&str] = match browser {
                Browser::Chrome => &["Google/Chrome"],
                Browser::Chromium => &["Chromium"],
                Browser::Opera => &["com.operasoftware.Opera"],
                Browser::OperaGx => &["com.operasoftware.OperaGX"],
                Browser::Brave => &["BraveSoftware/Brave-Browser"],
                Browser::Edge => &["Microsoft Edge"],
                Browser::Vivaldi => &["Vivaldi"],
                _ => &[],
            };
            roots.extend(rel.iter().map(|r| support.join(r)));
        }
    }

    #[cfg(target_os = "windows")]
    {
        match browser {
            Browser::Opera | Browser::OperaGx => {
                if let Some(roaming) = dirs::config_dir() {
                    let rel = if browser == Browser::Opera {
                        "Opera Software/Opera Stable"
                    } else {
                        "Opera Software/Opera GX Stable"
                    };
                    roots.push(roaming.join(rel));
                }
            }
            _ => {
                if let Some(local) = dirs::data_local_dir() {
                    let rel: &[&str] = match browser {
                        Browser::Chrome => &["Google/Chrome/User Data"],
                        Browser::Chromium => &["Chromium/User Data"],
                        Browser::Brave => &["BraveSoftware/Brave-Browser/User Data"],
                        Browser::Edge => &["Microsoft/Edge/User Data"],
                        Browser::Vivaldi => &["Vivaldi/User Data"],
                        _ => &[],
                    };
                    roots.extend(rel.iter().map(|r| local.join(r)));
                }
            }
        }
    }

    roots.retain(|p| p.is_dir());
    roots
}

/// Ask the login keychain for the browser's Safe Storage password
#[cfg(target_os = "macos")]
fn macos_safe_storage_password(browser: Browser) -> Result<String, CookieStoreError> {
    let (service, account) = match browser {
        Browser::Chrome => ("Chrome Safe Storage", "Chrome"),
        Browser::Chromium => ("Chromium Safe Storage", "Chromium"),
        Browser::Brave => ("Brave Safe Storage", "Brave"),
        Browser::Edge => ("Microsoft Edge Safe Storage", "Microsoft Edge"),
        Browser::Vivaldi => ("Vivaldi Safe Storage", "Vivaldi"),
        Browser::Opera | Browser::OperaGx => ("Opera Safe Storage", "Opera"),
        _ => return Err(CookieStoreError::NotInstalled),
    };

    let output = std::process::Command::new("security")
        .args(["find-generic-password", "-w", "-a", account, "-s", service])
        .output()?;
    if !output.status.success() {
        return Err(CookieStoreError::PermissionDenied(format!(
            "keychain refused '{service}'"
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

#[cfg(windows)]
mod windows_impl {
    use std::path::Path;

    use base64::Engine;
    use windows::Win32::Foundation::{LocalFree, HLOCAL};
    use windows::Win32::Security::Cryptography::{CryptUnprotectData, CRYPT_INTEGER_BLOB};

    use super::CookieStoreError;

    /// AES-256-GCM key from the `Local State` file, unwrapped with DPAPI
    pub(super) fn local_state_key(root: &Path) -> Result<Vec<u8>, CookieStoreError> {
        let data = std::fs::read(root.join("Local State"))?;
        let json: serde_json::Value = serde_json::from_slice(&data)
            .map_err(|e| CookieStoreError::Malformed(format!("Local State: {e}")))?;
        let encoded = json["os_crypt"]["encrypted_key"]
            .as_str()
            .ok_or_else(|| CookieStoreError::Malformed("Local State has no encrypted_key".into()))?;
        let mut wrapped = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CookieStoreError::Malformed(format!("encrypted_key: {e}")))?;
        if wrapped.starts_with(b"DPAPI") {
            wrapped.drain(..5);
        }
        dpapi_unprotect(&wrapped)
    }

    pub(super) fn dpapi_unprotect(data: &[u8]) -> Result<Vec<u8>, CookieStoreError> {
        unsafe {
            let in_blob = CRYPT_INTEGER_BLOB {
                cbData: data.len() as u32,
                pbData: data.as_ptr() as *mut _,
            };
            let mut out_blob = CRYPT_INTEGER_BLOB {
                cbData: 0,
                pbData: std::ptr::null_mut(),
            };
            CryptUnprotectData(&in_blob, None, None, None, None, 0, &mut out_blob)
                .map_err(|_| CookieStoreError::Decrypt("CryptUnprotectData failed".into()))?;
            let out = std::slice::from_raw_parts(out_blob.pbData, out_blob.cbData as usize).to_vec();
            // DPAPI allocates the output buffer; the caller owns freeing it
            let _ = LocalFree(HLOCAL(out_blob.pbData as *mut _));
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};

    use super::*;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    fn encrypt_v10(key: &[u8; 16], plain: &[u8]) -> Vec<u8> {
        let ct = Aes128CbcEnc::new(key.into(), &CBC_IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain);
        let mut out = b"v10".to_vec();
        out.extend_from_slice(&ct);
        out
    }

    #[test]
    fn test_cbc_roundtrip_with_peanuts_key() {
        let key = derive_cbc_key(b"peanuts", 1);
        let encrypted = encrypt_v10(&key, b"chrome_psid_value");

        let decryptor = ValueDecryptor::with_cbc_key(key);
        let value = decryptor.decrypt(&encrypted, ".google.com").unwrap();
        assert_eq!(value, "chrome_psid_value");
    }

    #[test]
    fn test_host_hash_prefix_is_stripped() {
        let host = ".google.com";
        let mut plain = Sha256::digest(host.as_bytes()).to_vec();
        plain.extend_from_slice(b"real_value");

        let key = derive_cbc_key(b"peanuts", 1);
        let encrypted = encrypt_v10(&key, &plain);

        let decryptor = ValueDecryptor::with_cbc_key(key);
        assert_eq!(decryptor.decrypt(&encrypted, host).unwrap(), "real_value");
    }

    #[test]
    fn test_unversioned_value_is_rejected_off_windows() {
        let key = derive_cbc_key(b"peanuts", 1);
        let decryptor = ValueDecryptor::with_cbc_key(key);
        let result = decryptor.decrypt(b"plain-dpapi-blob", ".google.com");
        #[cfg(not(windows))]
        assert!(result.is_err());
        #[cfg(windows)]
        let _ = result;
    }

    #[test]
    fn test_read_db_mixes_plain_and_encrypted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("Cookies");

        let key = derive_cbc_key(b"peanuts", 1);
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE cookies (
                host_key TEXT, name TEXT, value TEXT, encrypted_value BLOB
             );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cookies VALUES ('.google.com', 'NID', 'plain_nid', x'')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cookies VALUES ('.google.com', '__Secure-1PSID', '', ?1)",
            [encrypt_v10(&key, b"secret_psid")],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cookies VALUES ('.example.org', 'OTHER', 'nope', x'')",
            [],
        )
        .unwrap();
        drop(conn);

        let decryptor = ValueDecryptor::with_cbc_key(key);
        let mut cookies = read_db(&db_path, "google.com", &decryptor).unwrap();
        cookies.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "NID");
        assert_eq!(cookies[0].value, "plain_nid");
        assert_eq!(cookies[1].name, "__Secure-1PSID");
        assert_eq!(cookies[1].value, "secret_psid");
    }

    #[test]
    fn test_undecryptable_row_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("Cookies");

        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE cookies (
                host_key TEXT, name TEXT, value TEXT, encrypted_value BLOB
             );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cookies VALUES ('.google.com', 'BROKEN', '', x'763130deadbeef')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO cookies VALUES ('.google.com', 'GOOD', 'ok', x'')",
            [],
        )
        .unwrap();
        drop(conn);

        let decryptor = ValueDecryptor::with_cbc_key(derive_cbc_key(b"peanuts", 1));
        let cookies = read_db(&db_path, "google.com", &decryptor).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "GOOD");
    }
}
