use crate::error::*;
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_yaml_ng::Value;
use snafu::{ensure, OptionExt, ResultExt};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const INPUT_TOKEN: &str = "${INPUT_FILENAME}";
const PROFILE_TOKEN: &str = "${PROFILE_FILENAME}";

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct Selection {
    pub name: String,
    pub value: String,
}

/// One output file and the patches it selects, in file order.
#[derive(Clone, PartialEq, Debug)]
pub(crate) struct Profile {
    pub path: PathBuf,
    pub selections: Vec<Selection>,
}

impl Profile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Base names substituted into output filename templates.
#[derive(Clone, PartialEq, Debug, Default)]
pub(crate) struct FilenameTokens {
    pub input: String,
    pub profile: String,
}

impl FilenameTokens {
    pub fn from_paths(input: &Path, profile: &Path) -> Self {
        let stem = |path: &Path| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        FilenameTokens {
            input: stem(input),
            profile: stem(profile),
        }
    }

    pub fn apply(&self, template: &str) -> String {
        template
            .replace(INPUT_TOKEN, &self.input)
            .replace(PROFILE_TOKEN, &self.profile)
    }
}

pub(crate) fn load_profiles(
    path: &Path,
    output: &Path,
    tokens: &FilenameTokens,
) -> Result<Vec<Profile>> {
    let text = fs::read_to_string(path).context(ReadFile { path })?;
    parse_profiles(&text, output, tokens)
}

pub(crate) fn parse_profiles(
    text: &str,
    output: &Path,
    tokens: &FilenameTokens,
) -> Result<Vec<Profile>> {
    let document: Value = serde_yaml_ng::from_str(text).context(ParseProfile)?;
    ensure!(document.is_mapping(), UnexpectedProfileFormat);

    // Scalars are read into strings so values keep the text they were written with.
    let ProfileDocument(lists): ProfileDocument =
        serde_yaml_ng::from_str(text).context(ParseProfile)?;

    let mut profiles = Vec::with_capacity(lists.len());
    for (template, patches) in lists {
        let entries = match patches {
            PatchList::Entries(entries) => entries,
            PatchList::Unexpected => {
                log::warn!("unexpected node type for patch list '{}'", template);
                continue;
            }
        };

        let mut selections = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            selections.push(entry.0.context(MalformedSelection {
                profile: template.as_str(),
                index,
            })?);
        }

        profiles.push(Profile {
            path: output.join(tokens.apply(&template)),
            selections,
        });
    }

    Ok(profiles)
}

/// Output templates and their patch lists, in document order.
struct ProfileDocument(Vec<(String, PatchList)>);

enum PatchList {
    Entries(Vec<SelectionEntry>),
    Unexpected,
}

/// A `patch: value` entry, or `None` when the node has another shape.
struct SelectionEntry(Option<Selection>);

impl<'de> Deserialize<'de> for ProfileDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = ProfileDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of output files to patch lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut lists = Vec::new();
                while let Some(template) = map.next_key::<String>()? {
                    lists.push((template, map.next_value()?));
                }
                Ok(ProfileDocument(lists))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

impl<'de> Deserialize<'de> for PatchList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ListVisitor;

        impl<'de> Visitor<'de> for ListVisitor {
            type Value = PatchList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a patch list")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = seq.next_element()? {
                    entries.push(entry);
                }
                Ok(PatchList::Entries(entries))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(PatchList::Unexpected)
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
                Ok(PatchList::Unexpected)
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
                Ok(PatchList::Unexpected)
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
                Ok(PatchList::Unexpected)
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
                Ok(PatchList::Unexpected)
            }

            fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
                Ok(PatchList::Unexpected)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(PatchList::Unexpected)
            }
        }

        deserializer.deserialize_any(ListVisitor)
    }
}

impl<'de> Deserialize<'de> for SelectionEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = SelectionEntry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a `patch: value` entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let selection = map
                    .next_entry::<String, String>()?
                    .map(|(name, value)| Selection { name, value });
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(SelectionEntry(selection))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(SelectionEntry(None))
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
                Ok(SelectionEntry(None))
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
                Ok(SelectionEntry(None))
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
                Ok(SelectionEntry(None))
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
                Ok(SelectionEntry(None))
            }

            fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
                Ok(SelectionEntry(None))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(SelectionEntry(None))
            }
        }

        deserializer.deserialize_any(EntryVisitor)
    }
}
