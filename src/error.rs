use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("input does not exist: {}", path.display()))]
    MissingInput { path: PathBuf },

    #[snafu(display("profile does not exist: {}", path.display()))]
    MissingProfile { path: PathBuf },

    #[snafu(display("failed to create output dir {}: {}", path.display(), source))]
    CreateOutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to open {}: {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write {}: {}", path.display(), source))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse input file: {}", source))]
    ParseCatalogue { source: serde_json::Error },

    #[snafu(display("patch '{}' has no type", name))]
    MissingType { name: String },

    #[snafu(display("malformed {} patch '{}': {}", kind, name, source))]
    MalformedPatch {
        name: String,
        kind: &'static str,
        source: serde_json::Error,
    },

    #[snafu(display("union patch '{}' has no rva", name))]
    UnionWithoutRva { name: String },

    #[snafu(display("union patch '{}' option '{}' is not a byte string", name, option))]
    UnionOptionNotString { name: String, option: String },

    #[snafu(display("failed to parse profile file: {}", source))]
    ParseProfile { source: serde_yaml_ng::Error },

    #[snafu(display("unexpected profile format"))]
    UnexpectedProfileFormat,

    #[snafu(display(
        "malformed selection #{} in profile '{}': expected a single `patch: value` entry",
        index,
        profile
    ))]
    MalformedSelection { profile: String, index: usize },

    #[snafu(display("invalid number patch value for '{}': {:?}", name, value))]
    InvalidNumber {
        name: String,
        value: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display(
        "number patch value out of range: '{}' = {}, expected {}..={}",
        name,
        value,
        min,
        max
    ))]
    OutOfRange {
        name: String,
        value: i64,
        min: i32,
        max: i32,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
