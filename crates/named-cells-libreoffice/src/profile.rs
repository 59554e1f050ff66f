//! Private LibreOffice user profile
//!
//! Each backend handle runs `soffice` against its own user installation, so
//! it neither reuses nor disturbs a desktop session, and the profile's
//! registry can force formula recalculation whenever a file is loaded.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use tempfile::TempDir;

use crate::error::{LibreOfficeError, Result};

const REGISTRY_FILE: &str = "registrymodifications.xcu";
const RECALC_PATH: &str = "/org.openoffice.Office.Calc/Formula/Load";
/// `0` means "always recalculate"
const RECALC_ALWAYS: &str = "0";
const RECALC_PROPS: &[&str] = &["OOXMLRecalcMode", "ODFRecalcMode"];

/// A user installation directory, removed on drop
#[derive(Debug)]
pub(crate) struct Profile {
    dir: TempDir,
}

impl Profile {
    pub(crate) fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("named-cells-profile")
            .tempdir()?;
        let user = dir.path().join("user");
        fs::create_dir_all(&user)?;
        fs::write(user.join(REGISTRY_FILE), registry_xml()?)?;
        tracing::debug!("created LibreOffice profile in {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Value for `-env:UserInstallation=`
    pub(crate) fn url(&self) -> String {
        file_url(self.dir.path())
    }

    pub(crate) fn close(self) -> Result<()> {
        self.dir.close().map_err(LibreOfficeError::Io)
    }
}

fn registry_xml() -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut items = BytesStart::new("oor:items");
    items.push_attribute(("xmlns:oor", "http://openoffice.org/2001/registry"));
    items.push_attribute(("xmlns:xs", "http://www.w3.org/2001/XMLSchema"));
    items.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    writer.write_event(Event::Start(items))?;

    for prop_name in RECALC_PROPS {
        let mut item = BytesStart::new("item");
        item.push_attribute(("oor:path", RECALC_PATH));
        let mut prop = BytesStart::new("prop");
        prop.push_attribute(("oor:name", *prop_name));
        prop.push_attribute(("oor:op", "fuse"));

        for event in [
            Event::Start(item),
            Event::Start(prop),
            Event::Start(BytesStart::new("value")),
            Event::Text(BytesText::new(RECALC_ALWAYS)),
            Event::End(BytesEnd::new("value")),
            Event::End(BytesEnd::new("prop")),
            Event::End(BytesEnd::new("item")),
        ] {
            writer.write_event(event)?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("oor:items")))?;
    Ok(writer.into_inner())
}

/// `file://` URL of a local path, percent-encoding everything but
/// unreserved characters and separators
pub(crate) fn file_url(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let mut url = String::from("file://");
    if !text.starts_with('/') {
        url.push('/');
    }
    for b in text.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b':' => {
                url.push(b as char)
            }
            _ => url.push_str(&format!("%{b:02X}")),
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_url() {
        assert_eq!(file_url(Path::new("/tmp/a b/c")), "file:///tmp/a%20b/c");
        assert_eq!(file_url(Path::new("/tmp/ü")), "file:///tmp/%C3%BC");
        assert_eq!(file_url(Path::new(r"C:\Temp\x")), "file:///C:/Temp/x");
    }

    #[test]
    fn test_profile_forces_recalculation() {
        let profile = Profile::create().unwrap();
        let xcu = fs::read_to_string(profile.dir.path().join("user").join(REGISTRY_FILE)).unwrap();
        assert!(xcu.contains(r#"<item oor:path="/org.openoffice.Office.Calc/Formula/Load">"#));
        assert!(xcu.contains(r#"<prop oor:name="OOXMLRecalcMode" oor:op="fuse">"#));
        assert!(xcu.contains(r#"<prop oor:name="ODFRecalcMode" oor:op="fuse">"#));
        assert!(xcu.contains("<value>0</value>"));
        assert!(profile.url().starts_with("file:///"));

        let dir = profile.dir.path().to_path_buf();
        profile.close().unwrap();
        assert!(!dir.exists());
    }
}
