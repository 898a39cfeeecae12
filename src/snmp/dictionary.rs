//! Object identifier dictionaries
//!
//! A dictionary turns numeric identifiers into `MODULE::name.suffix` form so
//! the pipeline can key attributes by their short names. The core SNMPv2-MIB
//! objects are built in; vendor modules come from JSON files.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::oid::Oid;
use super::pdu::Value;
use crate::error::ConfigurationError;

const BUILTIN: &[(&str, &str, &str)] = &[
    ("SNMPv2-MIB", "sysDescr", "1.3.6.1.2.1.1.1"),
    ("SNMPv2-MIB", "sysObjectID", "1.3.6.1.2.1.1.2"),
    ("SNMPv2-MIB", "sysUpTime", "1.3.6.1.2.1.1.3"),
    ("SNMPv2-MIB", "sysName", "1.3.6.1.2.1.1.5"),
    ("SNMPv2-MIB", "snmpTrapOID", "1.3.6.1.6.3.1.1.4.1"),
    ("SNMPv2-MIB", "snmpTrapEnterprise", "1.3.6.1.6.3.1.1.4.3"),
    ("SNMPv2-MIB", "coldStart", "1.3.6.1.6.3.1.1.5.1"),
    ("SNMPv2-MIB", "warmStart", "1.3.6.1.6.3.1.1.5.2"),
    ("IF-MIB", "linkDown", "1.3.6.1.6.3.1.1.5.3"),
    ("IF-MIB", "linkUp", "1.3.6.1.6.3.1.1.5.4"),
    ("SNMPv2-MIB", "authenticationFailure", "1.3.6.1.6.3.1.1.5.5"),
    ("SNMP-COMMUNITY-MIB", "snmpTrapAddress", "1.3.6.1.6.3.18.1.3"),
];

/// On-disk dictionary module
#[derive(Debug, Deserialize)]
struct ModuleFile {
    module: String,
    objects: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Dictionary {
    objects: HashMap<Oid, String>,
    longest: usize,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Dictionary {
    /// Dictionary holding only the built-in SNMPv2 objects
    pub fn builtin() -> Self {
        let mut dict = Self {
            objects: HashMap::new(),
            longest: 0,
        };
        for (module, name, oid) in BUILTIN {
            if let Ok(oid) = oid.parse::<Oid>() {
                dict.insert(module, name, oid);
            }
        }
        dict
    }

    /// Built-in objects plus `<dir>/<MODULE>.json` for every listed module
    pub fn load(dir: &Path, modules: &[String]) -> Result<Self, ConfigurationError> {
        let mut dict = Self::builtin();
        for module in modules {
            dict.load_module(dir, module)?;
        }
        Ok(dict)
    }

    fn load_module(&mut self, dir: &Path, module: &str) -> Result<(), ConfigurationError> {
        let fail = |reason: String| ConfigurationError::Dictionary {
            module: module.to_string(),
            reason,
        };

        let path = dir.join(format!("{module}.json"));
        let content = std::fs::read_to_string(&path)
            .map_err(|e| fail(format!("{}: {e}", path.display())))?;
        let file: ModuleFile =
            serde_json::from_str(&content).map_err(|e| fail(format!("{}: {e}", path.display())))?;

        if file.module != module {
            return Err(fail(format!(
                "{} declares module '{}'",
                path.display(),
                file.module
            )));
        }

        for (name, oid) in &file.objects {
            let oid = oid.parse::<Oid>().map_err(|e| fail(format!("{name}: {e}")))?;
            self.insert(module, name, oid);
        }

        debug!(module, objects = file.objects.len(), "loaded dictionary module");
        Ok(())
    }

    pub fn insert(&mut self, module: &str, name: &str, oid: Oid) {
        self.longest = self.longest.max(oid.len());
        self.objects.insert(oid, format!("{module}::{name}"));
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Longest-prefix symbolic name, or the dotted form if nothing matches
    pub fn resolve(&self, oid: &Oid) -> String {
        let arcs = oid.arcs();
        for len in (1..=arcs.len().min(self.longest)).rev() {
            let prefix = Oid::from(&arcs[..len]);
            if let Some(name) = self.objects.get(&prefix) {
                let suffix = &arcs[len..];
                if suffix.is_empty() {
                    return name.clone();
                }
                let suffix = Oid::from(suffix);
                return format!("{name}.{suffix}");
            }
        }
        oid.to_string()
    }

    /// Renders a value as the string stored in the attribute map
    pub fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Integer(v) => v.to_string(),
            Value::OctetString(bytes) => render_octets(bytes),
            Value::Null => String::new(),
            Value::ObjectId(oid) => strip_module(&self.resolve(oid)).to_string(),
            Value::IpAddress(addr) => addr.to_string(),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => v.to_string(),
            Value::Counter64(v) => v.to_string(),
            Value::Opaque(bytes) => format!("0x{}", hex::encode(bytes)),
            Value::NoSuchObject => "noSuchObject".to_string(),
            Value::NoSuchInstance => "noSuchInstance".to_string(),
            Value::EndOfMibView => "endOfMibView".to_string(),
        }
    }
}

/// Printable text is kept as text, anything else is hex encoded with a `0x`
/// prefix (this is how DateAndTime values reach the drivers)
fn render_octets(bytes: &[u8]) -> String {
    let trimmed = match bytes.iter().rposition(|b| *b != 0) {
        Some(last) => &bytes[..=last],
        None => &bytes[..0],
    };
    match std::str::from_utf8(trimmed) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c.is_whitespace()) => text.to_string(),
        _ => format!("0x{}", hex::encode(bytes)),
    }
}

fn strip_module(value: &str) -> &str {
    match value.split_once("::") {
        Some((_, rest)) => rest,
        None => value,
    }
}

/// Attribute name for a resolved identifier
///
/// Drops the module qualification and any instance suffix:
/// `ISM-STORAGE-SVC-MIB::hwIsmReportingAlarmNodeCode.0` becomes
/// `hwIsmReportingAlarmNodeCode`. Identifiers with no module part were not
/// resolved and yield `None`.
pub fn short_name(identifier: &str) -> Option<&str> {
    let (_, qualified) = identifier.split_once("::")?;
    let name = qualified.split('.').next().unwrap_or_default();
    if name.is_empty() { None } else { Some(name) }
}
