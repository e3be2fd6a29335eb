use crate::error::*;
use serde::Deserialize;
use serde_json::{Map, Value};
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One toggled memory location of a default patch.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub(crate) struct ByteEdit {
    pub rva: String,
    pub on: String,
    pub off: String,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub(crate) struct DefaultPatch {
    pub edits: Vec<ByteEdit>,
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct UnionOption {
    pub name: String,
    pub bytes: String,
}

/// Mutually exclusive byte payloads written at a single address.
#[derive(Clone, PartialEq, Debug, Default)]
pub(crate) struct UnionPatch {
    pub rva: String,
    pub off: String,
    pub options: Vec<UnionOption>,
}

/// A numeric field whose value comes from the profile.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub(crate) struct NumberPatch {
    pub rva: String,
    pub off: String,
    pub min: i32,
    pub max: i32,
    pub size: u32,
}

impl NumberPatch {
    pub fn contains(&self, value: i64) -> bool {
        i64::from(self.min) <= value && value <= i64::from(self.max)
    }

    pub fn encode(&self, value: i64) -> String {
        encode_number(value, self.size)
    }
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) enum PatchDefinition {
    Default(DefaultPatch),
    Union(UnionPatch),
    Number(NumberPatch),
}

/// Encodes `value` as `size` little-endian bytes of uppercase hex.
///
/// High bits that do not fit are dropped. Bytes past the eighth repeat the
/// sign fill of the value.
pub(crate) fn encode_number(value: i64, size: u32) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut result = String::with_capacity(size as usize * 2);
    for i in 0..size {
        let shift = (8 * i).min(63);
        let byte = ((value >> shift) & 0xFF) as u8;
        result.push(HEX[usize::from(byte >> 4)] as char);
        result.push(HEX[usize::from(byte & 0x0F)] as char);
    }
    result
}

fn parse_address(value: &str) -> String {
    value.strip_prefix("0x").unwrap_or(value).to_string()
}

/// The parsed patch catalogue for one target file.
#[derive(Clone, PartialEq, Debug, Default)]
pub(crate) struct Catalogue {
    pub file: String,
    pub validate: Vec<String>,
    patches: BTreeMap<String, PatchDefinition>,
}

#[derive(Deserialize)]
struct CatalogueDocument {
    info: InfoDocument,
    data: Map<String, Value>,
}

#[derive(Deserialize)]
struct InfoDocument {
    file: String,
    #[serde(rename = "mempatcherValidate", default)]
    validate: Option<Value>,
}

#[derive(Deserialize)]
struct DefaultDocument {
    patches: Vec<ByteEdit>,
}

#[derive(Deserialize)]
struct UnionDocument {
    default: String,
    patches: Map<String, Value>,
}

#[derive(Deserialize)]
struct NumberDocument {
    patches: NumberPatch,
}

impl Catalogue {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).context(ReadFile { path })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: CatalogueDocument = serde_json::from_str(text).context(ParseCatalogue)?;

        let validate = match document.info.validate {
            Some(Value::Array(lines)) => lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let mut catalogue = Catalogue {
            file: document.info.file,
            validate,
            patches: BTreeMap::new(),
        };

        for (name, entry) in document.data {
            match parse_definition(&name, entry)? {
                Some(patch) => {
                    catalogue.insert(name, patch);
                }
                None => log::debug!("skipping patch '{}' of unknown type", name),
            }
        }

        Ok(catalogue)
    }

    /// Adds a definition, replacing any earlier one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, patch: PatchDefinition) {
        self.patches.insert(name.into(), patch);
    }

    pub fn lookup(&self, name: &str) -> Option<&PatchDefinition> {
        self.patches.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patches.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }
}

fn parse_definition(name: &str, entry: Value) -> Result<Option<PatchDefinition>> {
    let kind = entry
        .get("type")
        .and_then(Value::as_str)
        .context(MissingType { name })?;

    let patch = match kind {
        "default" => {
            let document: DefaultDocument =
                serde_json::from_value(entry).context(MalformedPatch {
                    name,
                    kind: "default",
                })?;
            let edits = document
                .patches
                .into_iter()
                .map(|edit| ByteEdit {
                    rva: parse_address(&edit.rva),
                    ..edit
                })
                .collect();
            PatchDefinition::Default(DefaultPatch { edits })
        }
        "union" => {
            let document: UnionDocument =
                serde_json::from_value(entry).context(MalformedPatch {
                    name,
                    kind: "union",
                })?;
            let mut rva = None;
            let mut options = Vec::new();
            for (option, bytes) in document.patches {
                match option.as_str() {
                    "offset" => continue,
                    "rva" => {
                        let text = bytes.as_str().context(UnionWithoutRva { name })?;
                        rva = Some(parse_address(text));
                    }
                    _ => {
                        let bytes = match bytes {
                            Value::String(bytes) => bytes,
                            _ => return UnionOptionNotString { name, option }.fail(),
                        };
                        options.push(UnionOption {
                            name: option,
                            bytes,
                        });
                    }
                }
            }
            PatchDefinition::Union(UnionPatch {
                rva: rva.context(UnionWithoutRva { name })?,
                off: document.default,
                options,
            })
        }
        "number" => {
            let document: NumberDocument =
                serde_json::from_value(entry).context(MalformedPatch {
                    name,
                    kind: "number",
                })?;
            let patch = document.patches;
            PatchDefinition::Number(NumberPatch {
                rva: parse_address(&patch.rva),
                ..patch
            })
        }
        _ => return Ok(None),
    };

    Ok(Some(patch))
}
