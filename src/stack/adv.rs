//! Advertising data decoding

/// AD type: Shortened Local Name
pub const AD_TYPE_NAME_SHORT: u8 = 0x08;

/// AD type: Complete Local Name
pub const AD_TYPE_NAME_COMPLETE: u8 = 0x09;

/// Find the payload of the first AD structure of type `ad_type`
///
/// Parsing stops at a zero length byte or at a structure that runs past the
/// end of `data`.
pub fn resolve(data: &[u8], ad_type: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        if data[i + 1] == ad_type {
            return Some(&data[i + 2..i + 1 + len]);
        }
        i += len + 1;
    }
    None
}

/// Complete local name field of an advertisement, if present
pub fn complete_local_name(data: &[u8]) -> Option<&[u8]> {
    resolve(data, AD_TYPE_NAME_COMPLETE)
}

/// Encode a single AD structure
///
/// Returns `None` when the payload does not fit the one-byte length field.
pub fn encode(ad_type: u8, payload: &[u8]) -> Option<Vec<u8>> {
    let len = u8::try_from(payload.len().checked_add(1)?).ok()?;
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(len);
    out.push(ad_type);
    out.extend_from_slice(payload);
    Some(out)
}
