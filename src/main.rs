mod error;
mod patch;
mod profile;
mod render;
mod unmatched;

use crate::error::*;
use crate::patch::Catalogue;
use crate::profile::{load_profiles, FilenameTokens};
use crate::render::{RenderOptions, Renderer, RunState, ValidationHeader};
use snafu::{ensure, ResultExt};
use std::fs;
use std::path::PathBuf;
use std::process;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "patchsplit",
    about = "organization utility for mempatch-hook format patches"
)]
struct Options {
    /// input .json metadata
    #[structopt(short, long, parse(from_os_str))]
    input: PathBuf,
    /// input .yml split file
    #[structopt(short, long, parse(from_os_str))]
    profile: PathBuf,
    /// split output directory
    #[structopt(short, long, parse(from_os_str))]
    output: PathBuf,
    /// exclude original patch bytes
    #[structopt(short = "N", long)]
    no_verify: bool,
    /// include all union options
    #[structopt(short = "U", long = "union-all-opts")]
    union_all_options: bool,
    /// write the validation lines to the first file only, or to every file
    #[structopt(
        long,
        possible_values = &ValidationHeader::variants(),
        case_insensitive = true,
        default_value = "Once"
    )]
    validation_header: ValidationHeader,
}

impl Options {
    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            no_verify: self.no_verify,
            union_all_options: self.union_all_options,
            validation_header: self.validation_header,
        }
    }
}

fn run(opt: &Options) -> Result<()> {
    ensure!(opt.input.exists(), MissingInput { path: &opt.input });
    ensure!(opt.profile.exists(), MissingProfile { path: &opt.profile });
    fs::create_dir_all(&opt.output).context(CreateOutputDir { path: &opt.output })?;

    let catalogue = Catalogue::load(&opt.input)?;
    let tokens = FilenameTokens::from_paths(&opt.input, &opt.profile);
    let profiles = load_profiles(&opt.profile, &opt.output, &tokens)?;

    log::info!(
        "read {} patches from input file '{}'",
        catalogue.len(),
        opt.input.display()
    );

    let renderer = Renderer::new(&catalogue, opt.render_options());
    let mut state = RunState::new(&catalogue);

    for profile in &profiles {
        let buffer = match renderer.render(profile, &mut state)? {
            Some(buffer) => buffer,
            None => continue,
        };

        log::info!(
            "writing {} patches to '{}'",
            profile.selections.len(),
            profile.path.display()
        );
        fs::write(&profile.path, buffer).context(WriteFile {
            path: &profile.path,
        })?;
    }

    for name in state.unmatched.remaining() {
        log::warn!("patch '{}' not used in profile", name);
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Options::from_args();
    log::debug!("{:?}", opt);

    if let Err(e) = run(&opt) {
        eprintln!("fatal: {}", e);
        process::exit(1);
    }
}
