//! Firefox-family cookie stores
//!
//! Firefox and LibreWolf keep cookies in `cookies.sqlite` inside each
//! profile, values unencrypted. Profiles live under a per-OS root; scanning
//! the directory beats parsing `profiles.ini` and also finds containers the
//! ini does not mention.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use super::{snapshot_db, Browser, CookieStoreError, RawCookie};

pub(super) fn read(browser: Browser, domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
    let stores = find_cookie_dbs(browser);
    if stores.is_empty() {
        return Err(CookieStoreError::NotInstalled);
    }

    let mut cookies = Vec::new();
    let mut last_err = None;
    for db in stores {
        match read_db(&db, domain) {
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

/// Read one profile's `cookies.sqlite` through a snapshot copy
pub(super) fn read_db(db_path: &Path, domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
    let snapshot = snapshot_db(db_path)?;
    let result = query_cookies(&snapshot, domain);
    let _ = std::fs::remove_file(&snapshot);
    result
}

fn query_cookies(db_path: &Path, domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare("SELECT host, name, value FROM moz_cookies WHERE host LIKE ?1")?;
    let rows = stmt.query_map([format!("%{domain}%")], |row| {
        Ok(RawCookie {
            host: row.get(0)?,
            name: row.get(1)?,
            value: row.get(2)?,
        })
    })?;

    let mut cookies = Vec::new();
    for row in rows {
        cookies.push(row?);
    }
    Ok(cookies)
}

/// Every `cookies.sqlite` under the browser's profile roots
fn find_cookie_dbs(browser: Browser) -> Vec<PathBuf> {
    let mut dbs = Vec::new();
    for root in profile_roots(browser) {
        let direct = root.join("cookies.sqlite");
        if direct.is_file() {
            dbs.push(direct);
        }
        if let Ok(entries) = std::fs::read_dir(&root) {
            for entry in entries.flatten() {
                let candidate = entry.path().join("cookies.sqlite");
                if candidate.is_file() {
                    dbs.push(candidate);
                }
            }
        }
    }
    dbs
}

fn profile_roots(browser: Browser) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();

    #[cfg(target_os = "linux")]
    {
        if let Some(home) = dirs::home_dir() {
            match browser {
                Browser::Librewolf => roots.push(home.join(".librewolf")),
                _ => {
                    roots.push(home.join(".mozilla/firefox"));
                    // Snap and flatpak installs keep their own homes
                    roots.push(home.join("snap/firefox/common/.mozilla/firefox"));
                    roots.push(home.join(".var/app/org.mozilla.firefox/.mozilla/firefox"));
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(support) = dirs::config_dir() {
            match browser {
                Browser::Librewolf => roots.push(support.join("librewolf/Profiles")),
                _ => roots.push(support.join("Firefox/Profiles")),
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(roaming) = dirs::config_dir() {
            match browser {
                Browser::Librewolf => roots.push(roaming.join("librewolf/Profiles")),
                _ => roots.push(roaming.join("Mozilla/Firefox/Profiles")),
            }
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = browser;
    }

    roots.retain(|p| p.is_dir());
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_store(db_path: &Path, rows: &[(&str, &str, &str)]) {
        let conn = Connection::open(db_path).unwrap();
        conn.execute_batch("CREATE TABLE moz_cookies (host TEXT, name TEXT, value TEXT);")
            .unwrap();
        for (host, name, value) in rows {
            conn.execute("INSERT INTO moz_cookies VALUES (?1, ?2, ?3)", [host, name, value])
                .unwrap();
        }
    }

    #[test]
    fn test_domain_filter_is_substring_match() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cookies.sqlite");
        write_store(
            &db_path,
            &[
                (".google.com", "__Secure-1PSID", "psid_value"),
                ("accounts.google.com", "__Secure-1PSIDTS", "psidts_value"),
                (".example.org", "SESSION", "other"),
            ],
        );

        let cookies = read_db(&db_path, "google.com").unwrap();
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|c| c.host.contains("google.com")));
    }

    #[test]
    fn test_empty_store_yields_no_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cookies.sqlite");
        write_store(&db_path, &[]);

        let cookies = read_db(&db_path, "google.com").unwrap();
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cookies.sqlite");
        Connection::open(&db_path).unwrap();

        assert!(read_db(&db_path, "google.com").is_err());
    }
}
