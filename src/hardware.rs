//! Compatibility-archive extractor.
//!
//! Release archives embed a descriptor document (`content.xml`) listing the
//! hardware the firmware supports. Build pipelines over the years wrote the
//! embedded path with either platform-native or forward-slash separators, and
//! one generation of the producer emitted a truncated trailing element, so
//! extraction tries both paths and applies a targeted textual repair before
//! parsing.

use std::borrow::Cow;
use std::io::{Cursor, Read};

use thiserror::Error;
use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::github::{FetchError, ReleaseHost};
use crate::model::{CompatibilityDescriptor, Release};

/// Alternative embedded locations of the descriptor document.
pub const DESCRIPTOR_PATHS: [&str; 2] = ["data\\content.xml", "data/content.xml"];

/// Old producer builds closed the trailing `ETS` element with the document's
/// own closing tag. The repair is a no-op when the bug is absent.
const BROKEN_ETS_SEQUENCE: &str = "<ETS></Content>";
const REPAIRED_ETS_SEQUENCE: &str = "<ETS></ETS></Content>";

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to open release archive: {0}")]
    Archive(#[from] ZipError),
    #[error("failed to read descriptor from archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("descriptor XML unparseable: {0}")]
    Xml(String),
}

/// Rewrite the known truncated sequence to its well-formed counterpart.
pub fn repair_descriptor(text: &str) -> Cow<'_, str> {
    if text.contains(BROKEN_ETS_SEQUENCE) {
        Cow::Owned(text.replace(BROKEN_ETS_SEQUENCE, REPAIRED_ETS_SEQUENCE))
    } else {
        Cow::Borrowed(text)
    }
}

/// Parse a (repaired) descriptor document: the ordered `Name` attributes of
/// every `Product` entry in the `Products` collection, verbatim.
pub fn parse_descriptor(xml: &str) -> Result<CompatibilityDescriptor, DescriptorError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_reader(xml.as_bytes());
    // Mismatched closing tags must fail the parse; the repair step above is
    // the only tolerated malformation.
    reader.config_mut().check_end_names = true;

    let mut buf = Vec::new();
    let mut in_products = false;
    let mut devices = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"Products" => in_products = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"Products" => in_products = false,
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if in_products && e.name().as_ref() == b"Product" =>
            {
                let attr = e
                    .try_get_attribute("Name")
                    .map_err(|e| DescriptorError::Xml(e.to_string()))?;
                if let Some(attr) = attr {
                    let name = attr
                        .unescape_value()
                        .map_err(|e| DescriptorError::Xml(e.to_string()))?;
                    devices.push(name.into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DescriptorError::Xml(e.to_string())),
            Ok(_) => {}
        }
        buf.clear();
    }

    Ok(CompatibilityDescriptor { devices })
}

/// Open archive bytes and extract the embedded descriptor.
///
/// `Ok(None)` means the archive carries no descriptor at either known path —
/// an expected state, the caller moves on to the next asset.
pub fn extract_descriptor(
    archive_bytes: &[u8],
) -> Result<Option<CompatibilityDescriptor>, DescriptorError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    for path in DESCRIPTOR_PATHS {
        match archive.by_name(path) {
            Ok(mut file) => {
                let mut text = String::new();
                file.read_to_string(&mut text)?;
                let repaired = repair_descriptor(&text);
                return parse_descriptor(&repaired).map(Some);
            }
            Err(ZipError::FileNotFound) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(None)
}

/// Descriptor of `app`'s most recent release, if any.
///
/// Only the newest release is considered; its assets are tried strictly in
/// listed order (the order encodes priority) and the first successful parse
/// wins. Per-asset failures are diagnostics, not faults; transport errors
/// propagate.
pub async fn latest_release_devices<H>(
    host: &H,
    app: &str,
    releases: &[Release],
    diagnostics: &mut Diagnostics,
) -> Result<Option<CompatibilityDescriptor>, FetchError>
where
    H: ReleaseHost + ?Sized,
{
    let Some(latest) = releases.first() else {
        debug!(app = %app, "No releases; no compatibility descriptor");
        return Ok(None);
    };

    for asset in &latest.assets {
        let Some(bytes) = host.asset_bytes(&asset.browser_download_url).await? else {
            continue;
        };
        match extract_descriptor(&bytes) {
            Ok(Some(descriptor)) => {
                info!(
                    app = %app,
                    asset = %asset.name,
                    devices = descriptor.devices.len(),
                    "Extracted compatibility descriptor"
                );
                return Ok(Some(descriptor));
            }
            Ok(None) => {
                debug!(app = %app, asset = %asset.name, "Asset carries no descriptor");
            }
            Err(e) => diagnostics.push(Diagnostic::DescriptorUnparseable {
                app: app.to_string(),
                asset: asset.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const HEALTHY: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
        <Content><Products>\
        <Product Name=\"OpenKNX UP1\"/>\
        <Product Name=\"Smart-MF S0-Z\u{00e4}hlermodul\"/>\
        </Products><ETS></ETS></Content>";

    const BROKEN_REPAIRABLE: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
        <Content><Products>\
        <Product Name=\"OpenKNX UP1\"/>\
        <Product Name=\"Smart-MF S0-Z\u{00e4}hlermodul\"/>\
        </Products><ETS></Content>";

    const BROKEN_UNRECOGNIZED: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
        <Content><Products><Product Name=\"OpenKNX UP1\"/></Content>";

    fn archive_with(path: &str, xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(path, SimpleFileOptions::default())
            .expect("start file");
        writer.write_all(xml.as_bytes()).expect("write entry");
        writer.finish().expect("finish archive").into_inner()
    }

    #[test]
    fn parses_product_names_in_document_order() {
        let descriptor = parse_descriptor(HEALTHY).expect("healthy descriptor parses");
        assert_eq!(
            descriptor.devices,
            ["OpenKNX UP1", "Smart-MF S0-Z\u{00e4}hlermodul"]
        );
    }

    #[test]
    fn repair_fixes_truncated_ets_sequence() {
        let repaired = repair_descriptor(BROKEN_REPAIRABLE);
        let descriptor = parse_descriptor(&repaired).expect("repaired descriptor parses");
        let reference = parse_descriptor(HEALTHY).expect("reference parses");
        assert_eq!(descriptor, reference, "repair must match the hand-corrected document");
    }

    #[test]
    fn repair_is_a_no_op_on_healthy_documents() {
        assert!(matches!(repair_descriptor(HEALTHY), Cow::Borrowed(_)));
    }

    #[test]
    fn unrecognized_corruption_fails_without_panicking() {
        let repaired = repair_descriptor(BROKEN_UNRECOGNIZED);
        let result = parse_descriptor(&repaired);
        assert!(matches!(result, Err(DescriptorError::Xml(_))));
    }

    #[test]
    fn extracts_from_backslash_path() {
        let bytes = archive_with("data\\content.xml", HEALTHY);
        let descriptor = extract_descriptor(&bytes)
            .expect("archive opens")
            .expect("descriptor found");
        assert_eq!(descriptor.devices.len(), 2);
    }

    #[test]
    fn extracts_from_forward_slash_path() {
        let bytes = archive_with("data/content.xml", HEALTHY);
        let descriptor = extract_descriptor(&bytes)
            .expect("archive opens")
            .expect("descriptor found");
        assert_eq!(descriptor.devices.len(), 2);
    }

    #[test]
    fn archive_without_descriptor_is_not_found_not_an_error() {
        let bytes = archive_with("firmware.bin", "not xml");
        let result = extract_descriptor(&bytes).expect("archive opens");
        assert!(result.is_none());
    }

    #[test]
    fn broken_descriptor_inside_archive_is_repaired() {
        let bytes = archive_with("data/content.xml", BROKEN_REPAIRABLE);
        let descriptor = extract_descriptor(&bytes)
            .expect("archive opens")
            .expect("descriptor found");
        assert_eq!(descriptor.devices[0], "OpenKNX UP1");
    }
}
