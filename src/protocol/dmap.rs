//! DMAP track metadata
//!
//! Senders push now-playing information as `application/x-dmap-tagged`
//! `SET_PARAMETER` bodies: a sequence of `tag(4) length(u32 BE) value`
//! items, usually wrapped in an `mlit` container.

/// Track metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// Track title
    pub title: Option<String>,
    /// Artist name
    pub artist: Option<String>,
    /// Album name
    pub album: Option<String>,
    /// Genre
    pub genre: Option<String>,
    /// Track number
    pub track_number: Option<u32>,
    /// Total tracks on album
    pub track_count: Option<u32>,
    /// Disc number
    pub disc_number: Option<u32>,
    /// Total discs
    pub disc_count: Option<u32>,
    /// Duration in milliseconds
    pub duration_ms: Option<u32>,
}

impl TrackMetadata {
    /// Whether no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == TrackMetadata::default()
    }
}

/// DMAP tag codes
pub mod tags {
    pub const LISTING_ITEM: &[u8; 4] = b"mlit";
    pub const ITEM_NAME: &[u8; 4] = b"minm";
    pub const ITEM_ARTIST: &[u8; 4] = b"asar";
    pub const ITEM_ALBUM: &[u8; 4] = b"asal";
    pub const ITEM_GENRE: &[u8; 4] = b"asgn";
    pub const TRACK_NUMBER: &[u8; 4] = b"astn";
    pub const TRACK_COUNT: &[u8; 4] = b"astc";
    pub const DISC_NUMBER: &[u8; 4] = b"asdn";
    pub const DISC_COUNT: &[u8; 4] = b"asdc";
    pub const DURATION: &[u8; 4] = b"astm";
}

/// Errors parsing DMAP metadata
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// Length field overflowed
    #[error("Invalid DMAP format")]
    InvalidFormat,

    /// Data buffer ended inside an item
    #[error("Incomplete data")]
    IncompleteData,
}

/// Parse DMAP metadata from binary data
///
/// # Errors
/// Returns `MetadataError` if an item's length runs past the buffer.
pub fn parse_dmap_metadata(data: &[u8]) -> Result<TrackMetadata, MetadataError> {
    let mut metadata = TrackMetadata::default();
    parse_items(data, &mut metadata)?;
    Ok(metadata)
}

/// Numeric DMAP values are big-endian and 1, 2, 4 or 8 bytes wide
fn read_uint(value: &[u8]) -> Option<u32> {
    match *value {
        [a] => Some(u32::from(a)),
        [a, b] => Some(u32::from(u16::from_be_bytes([a, b]))),
        [a, b, c, d] => Some(u32::from_be_bytes([a, b, c, d])),
        [_, _, _, _, a, b, c, d] => Some(u32::from_be_bytes([a, b, c, d])),
        _ => None,
    }
}

fn parse_items(data: &[u8], metadata: &mut TrackMetadata) -> Result<(), MetadataError> {
    let mut offset = 0;

    while offset + 8 <= data.len() {
        let tag = &data[offset..offset + 4];
        let length = u32::from_be_bytes([
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
            data[offset + 7],
        ]) as usize;
        offset += 8;

        let end = offset
            .checked_add(length)
            .ok_or(MetadataError::InvalidFormat)?;
        if end > data.len() {
            return Err(MetadataError::IncompleteData);
        }

        let value = &data[offset..end];
        offset = end;

        let text = || Some(String::from_utf8_lossy(value).into_owned());
        match tag {
            t if t == tags::LISTING_ITEM => parse_items(value, metadata)?,
            t if t == tags::ITEM_NAME => metadata.title = text(),
            t if t == tags::ITEM_ARTIST => metadata.artist = text(),
            t if t == tags::ITEM_ALBUM => metadata.album = text(),
            t if t == tags::ITEM_GENRE => metadata.genre = text(),
            t if t == tags::TRACK_NUMBER => metadata.track_number = read_uint(value),
            t if t == tags::TRACK_COUNT => metadata.track_count = read_uint(value),
            t if t == tags::DISC_NUMBER => metadata.disc_number = read_uint(value),
            t if t == tags::DISC_COUNT => metadata.disc_count = read_uint(value),
            t if t == tags::DURATION => metadata.duration_ms = read_uint(value),
            _ => {}
        }
    }

    Ok(())
}

/// Encode a single DMAP item
#[must_use]
pub fn encode_item(tag: &[u8; 4], value: &[u8]) -> Vec<u8> {
    let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
    let mut out = Vec::with_capacity(8 + value.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: &str, artist: &str, album: &str) -> Vec<u8> {
        let mut inner = encode_item(tags::ITEM_NAME, title.as_bytes());
        inner.extend(encode_item(tags::ITEM_ARTIST, artist.as_bytes()));
        inner.extend(encode_item(tags::ITEM_ALBUM, album.as_bytes()));
        inner.extend(encode_item(tags::TRACK_NUMBER, &3u16.to_be_bytes()));
        inner.extend(encode_item(b"mper", &[0u8; 8]));
        encode_item(tags::LISTING_ITEM, &inner)
    }

    #[test]
    fn test_parse_listing_container() {
        let metadata = parse_dmap_metadata(&listing("Song", "Band", "Record")).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Song"));
        assert_eq!(metadata.artist.as_deref(), Some("Band"));
        assert_eq!(metadata.album.as_deref(), Some("Record"));
        assert_eq!(metadata.track_number, Some(3));
    }

    #[test]
    fn test_parse_flat_items() {
        let mut data = encode_item(tags::ITEM_NAME, b"Flat");
        data.extend(encode_item(tags::DURATION, &180_000u32.to_be_bytes()));
        let metadata = parse_dmap_metadata(&data).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Flat"));
        assert_eq!(metadata.duration_ms, Some(180_000));
    }

    #[test]
    fn test_truncated_item() {
        let mut data = encode_item(tags::ITEM_NAME, b"Truncated");
        data.truncate(12);
        assert_eq!(
            parse_dmap_metadata(&data),
            Err(MetadataError::IncompleteData)
        );
    }

    #[test]
    fn test_empty_body() {
        assert!(parse_dmap_metadata(&[]).unwrap().is_empty());
    }
}
