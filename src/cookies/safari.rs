//! Safari cookie store
//!
//! Safari keeps cookies in `Cookies.binarycookies`, a little binary page
//! format: a `cook` magic, big-endian page sizes, then pages of cookie
//! records with little-endian field offsets and NUL-terminated strings.
//! The parser is pure so it can be tested off-macOS; only path discovery is
//! platform specific.

use super::{CookieStoreError, RawCookie};

const MAGIC: &[u8; 4] = b"cook";
const PAGE_HEADER: u32 = 0x0000_0100;

#[cfg(target_os = "macos")]
pub(super) fn read(domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
    let Some(home) = dirs::home_dir() else {
        return Err(CookieStoreError::NotInstalled);
    };
    let candidates = [
        home.join("Library/Containers/com.apple.Safari/Data/Library/Cookies/Cookies.binarycookies"),
        home.join("Library/Cookies/Cookies.binarycookies"),
    ];

    for path in candidates {
        match std::fs::read(&path) {
            Ok(data) => return parse_binarycookies(&data, domain),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                // Sandboxed store needs Full Disk Access granted to the caller
                return Err(CookieStoreError::PermissionDenied(e.to_string()));
            }
            Err(e) => return Err(CookieStoreError::Io(e)),
        }
    }
    Err(CookieStoreError::NotInstalled)
}

#[cfg(not(target_os = "macos"))]
pub(super) fn read(_domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
    Err(CookieStoreError::UnsupportedPlatform)
}

/// Parse a whole `Cookies.binarycookies` blob, keeping cookies whose host
/// contains `domain`
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(super) fn parse_binarycookies(data: &[u8], domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
    if data.len() < 8 || &data[..4] != MAGIC {
        return Err(CookieStoreError::Malformed("missing 'cook' magic".into()));
    }

    let page_count = read_u32_be(data, 4)? as usize;
    let mut page_sizes = Vec::with_capacity(page_count);
    for i in 0..page_count {
        page_sizes.push(read_u32_be(data, 8 + i * 4)? as usize);
    }

    let mut cookies = Vec::new();
    let mut offset = 8 + page_count * 4;
    for size in page_sizes {
        let end = offset
            .checked_add(size)
            .filter(|&e| e <= data.len())
            .ok_or_else(|| CookieStoreError::Malformed("page overruns file".into()))?;
        parse_page(&data[offset..end], domain, &mut cookies)?;
        offset = end;
    }

    Ok(cookies)
}

fn parse_page(page: &[u8], domain: &str, out: &mut Vec<RawCookie>) -> Result<(), CookieStoreError> {
    if read_u32_be(page, 0)? != PAGE_HEADER {
        return Err(CookieStoreError::Malformed("bad page header".into()));
    }

    let cookie_count = read_u32_le(page, 4)? as usize;
    for i in 0..cookie_count {
        let record_offset = read_u32_le(page, 8 + i * 4)? as usize;
        if let Some(cookie) = parse_record(page, record_offset)? {
            if cookie.host.contains(domain) {
                out.push(cookie);
            }
        }
    }
    Ok(())
}

/// One cookie record; field offsets are relative to the record start
fn parse_record(page: &[u8], start: usize) -> Result<Option<RawCookie>, CookieStoreError> {
    let size = read_u32_le(page, start)? as usize;
    let end = start
        .checked_add(size)
        .filter(|&e| e <= page.len())
        .ok_or_else(|| CookieStoreError::Malformed("cookie record overruns page".into()))?;
    let record = &page[start..end];

    let url_offset = read_u32_le(record, 16)? as usize;
    let name_offset = read_u32_le(record, 20)? as usize;
    let value_offset = read_u32_le(record, 28)? as usize;

    let host = read_cstr(record, url_offset)?;
    let name = read_cstr(record, name_offset)?;
    let value = read_cstr(record, value_offset)?;

    if name.is_empty() {
        return Ok(None);
    }
    Ok(Some(RawCookie { name, value, host }))
}

fn read_cstr(data: &[u8], offset: usize) -> Result<String, CookieStoreError> {
    let tail = data
        .get(offset..)
        .ok_or_else(|| CookieStoreError::Malformed("string offset out of range".into()))?;
    let len = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
}

fn read_u32_be(data: &[u8], offset: usize) -> Result<u32, CookieStoreError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| CookieStoreError::Malformed("truncated u32".into()))
}

fn read_u32_le(data: &[u8], offset: usize) -> Result<u32, CookieStoreError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| CookieStoreError::Malformed("truncated u32".into()))
}
