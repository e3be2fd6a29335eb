use crate::error::*;
use crate::patch::{Catalogue, DefaultPatch, NumberPatch, PatchDefinition, UnionPatch};
use crate::profile::Profile;
use crate::unmatched::UnmatchedTracker;
use clap::arg_enum;
use snafu::{ensure, ResultExt};

arg_enum! {
    /// When the catalogue's validation lines are written.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum ValidationHeader {
        Once,
        Always
    }
}

impl Default for ValidationHeader {
    fn default() -> Self {
        ValidationHeader::Once
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct RenderOptions {
    /// Leave the original bytes off every payload line.
    pub no_verify: bool,
    /// Write every union option, commenting out the unselected ones.
    pub union_all_options: bool,
    pub validation_header: ValidationHeader,
}

/// State shared by every profile of a single run.
#[derive(Debug)]
pub(crate) struct RunState {
    header_pending: bool,
    pub unmatched: UnmatchedTracker,
}

impl RunState {
    pub fn new(catalogue: &Catalogue) -> Self {
        RunState {
            header_pending: true,
            unmatched: UnmatchedTracker::from_catalogue(catalogue),
        }
    }
}

pub(crate) struct Renderer<'a> {
    catalogue: &'a Catalogue,
    options: RenderOptions,
}

impl<'a> Renderer<'a> {
    pub fn new(catalogue: &'a Catalogue, options: RenderOptions) -> Self {
        Renderer { catalogue, options }
    }

    /// Renders one profile, returning `None` when it produces no output.
    ///
    /// Every selected patch found in the catalogue is marked as used in
    /// `state`. A number value outside its declared range aborts the render.
    pub fn render(&self, profile: &Profile, state: &mut RunState) -> Result<Option<String>> {
        let header = match self.options.validation_header {
            ValidationHeader::Once => std::mem::replace(&mut state.header_pending, false),
            ValidationHeader::Always => true,
        };

        let mut body = String::new();
        for selection in &profile.selections {
            let name = selection.name.as_str();
            let patch = match self.catalogue.lookup(name) {
                Some(patch) => patch,
                None => {
                    log::warn!(
                        "patch '{}' in profile '{}' not found",
                        name,
                        profile.file_name()
                    );
                    continue;
                }
            };

            state.unmatched.mark_used(name);
            body.push_str(&format!("\n## {}\n", name));

            match patch {
                PatchDefinition::Default(patch) => {
                    self.render_default(&mut body, patch, &selection.value)
                }
                PatchDefinition::Union(patch) => {
                    self.render_union(&mut body, patch, &selection.value)
                }
                PatchDefinition::Number(patch) => {
                    self.render_number(&mut body, name, patch, &selection.value)?
                }
            }
        }

        let mut buffer = String::new();
        if header
            && (self.options.validation_header == ValidationHeader::Once || !body.is_empty())
        {
            for line in &self.catalogue.validate {
                buffer.push_str(line);
                buffer.push('\n');
            }
        }

        buffer.push_str(&body);
        if buffer.is_empty() {
            log::debug!("profile '{}' is empty, skipping", profile.file_name());
            return Ok(None);
        }

        if buffer.starts_with('\n') {
            buffer.remove(0);
        }

        Ok(Some(buffer))
    }

    fn render_default(&self, buffer: &mut String, patch: &DefaultPatch, value: &str) {
        let enabled = matches!(value, "1" | "on" | "true");
        for edit in &patch.edits {
            self.push_line(buffer, enabled, &edit.rva, &edit.on, &edit.off);
        }
    }

    fn render_union(&self, buffer: &mut String, patch: &UnionPatch, value: &str) {
        for option in &patch.options {
            let enabled = value == option.name;
            if !enabled && !self.options.union_all_options {
                continue;
            }
            buffer.push_str(&format!("### {}\n", option.name));
            self.push_line(buffer, enabled, &patch.rva, &option.bytes, &patch.off);
        }
    }

    fn render_number(
        &self,
        buffer: &mut String,
        name: &str,
        patch: &NumberPatch,
        value: &str,
    ) -> Result<()> {
        let number: i64 = value
            .trim()
            .parse()
            .context(InvalidNumber { name, value })?;
        ensure!(
            patch.contains(number),
            OutOfRange {
                name,
                value: number,
                min: patch.min,
                max: patch.max,
            }
        );

        self.push_line(buffer, true, &patch.rva, &patch.encode(number), &patch.off);
        Ok(())
    }

    fn push_line(&self, buffer: &mut String, enabled: bool, rva: &str, bytes: &str, off: &str) {
        if !enabled {
            buffer.push_str("# ");
        }
        buffer.push_str(&format!("{} {} {}", self.catalogue.file, rva, bytes));
        if !self.options.no_verify {
            buffer.push(' ');
            buffer.push_str(off);
        }
        buffer.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Selection;
    use std::path::PathBuf;

    const CATALOGUE: &str = r##"{
        "info": { "file": "game.exe" },
        "data": {
            "p1": { "type": "default", "patches": [ { "rva": "0x100", "on": "90", "off": "55" } ] },
            "p2": {
                "type": "default",
                "patches": [
                    { "rva": "0x110", "on": "EB", "off": "74" },
                    { "rva": "0x120", "on": "90", "off": "75" }
                ]
            },
            "lang": {
                "type": "union",
                "default": "00",
                "patches": { "rva": "0x300", "offset": 0, "jp": "01", "en": "02", "kr": "03" }
            },
            "speed": {
                "type": "number",
                "patches": { "rva": "0x400", "off": "0A00", "min": -100, "max": 1000, "size": 2 }
            }
        }
    }"##;

    const VALIDATED: &str = r##"{
        "info": { "file": "game.exe", "mempatcherValidate": ["# game.exe v1.02", "game.exe 10 4D5A"] },
        "data": {
            "p1": { "type": "default", "patches": [ { "rva": "0x100", "on": "90", "off": "55" } ] }
        }
    }"##;

    fn catalogue(text: &str) -> Catalogue {
        Catalogue::from_json(text).unwrap()
    }

    fn profile(file: &str, selections: &[(&str, &str)]) -> Profile {
        Profile {
            path: PathBuf::from("out").join(file),
            selections: selections
                .iter()
                .map(|(name, value)| Selection {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    fn render_one(
        catalogue: &Catalogue,
        options: RenderOptions,
        selections: &[(&str, &str)],
    ) -> Result<Option<String>> {
        let mut state = RunState::new(catalogue);
        Renderer::new(catalogue, options).render(&profile("out.txt", selections), &mut state)
    }

    fn no_verify() -> RenderOptions {
        RenderOptions {
            no_verify: true,
            ..RenderOptions::default()
        }
    }

    fn union_all() -> RenderOptions {
        RenderOptions {
            union_all_options: true,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn single_default_patch() {
        let catalogue = catalogue(CATALOGUE);
        let output = render_one(&catalogue, RenderOptions::default(), &[("p1", "1")]).unwrap();
        assert_eq!(output.as_deref(), Some("## p1\ngame.exe 100 90 55\n"));

        let output = render_one(&catalogue, no_verify(), &[("p1", "1")]).unwrap();
        assert_eq!(output.as_deref(), Some("## p1\ngame.exe 100 90\n"));
    }

    #[test]
    fn default_patch_toggles() {
        let catalogue = catalogue(CATALOGUE);
        for value in &["1", "on", "true"] {
            let output = render_one(&catalogue, RenderOptions::default(), &[("p2", *value)])
                .unwrap()
                .unwrap();
            assert_eq!(output, "## p2\ngame.exe 110 EB 74\ngame.exe 120 90 75\n");
        }
        for value in &["0", "off", "", "false", "ON", "True", "0x1", "+1", "yes"] {
            let output = render_one(&catalogue, RenderOptions::default(), &[("p2", *value)])
                .unwrap()
                .unwrap();
            assert_eq!(output, "## p2\n# game.exe 110 EB 74\n# game.exe 120 90 75\n");
        }
    }

    #[test]
    fn union_renders_only_the_selected_option() {
        let catalogue = catalogue(CATALOGUE);
        let output = render_one(&catalogue, RenderOptions::default(), &[("lang", "en")]).unwrap();
        assert_eq!(output.as_deref(), Some("## lang\n### en\ngame.exe 300 02 00\n"));

        let output = render_one(&catalogue, RenderOptions::default(), &[("lang", "fr")]).unwrap();
        assert_eq!(output.as_deref(), Some("## lang\n"));
    }

    #[test]
    fn union_all_options_comments_the_rest() {
        let catalogue = catalogue(CATALOGUE);
        let output = render_one(&catalogue, union_all(), &[("lang", "en")]).unwrap();
        assert_eq!(
            output.as_deref(),
            Some(concat!(
                "## lang\n",
                "### jp\n# game.exe 300 01 00\n",
                "### en\ngame.exe 300 02 00\n",
                "### kr\n# game.exe 300 03 00\n",
            ))
        );
    }

    #[test]
    fn number_patch_encodes_value() {
        let catalogue = catalogue(CATALOGUE);
        let output = render_one(&catalogue, RenderOptions::default(), &[("speed", "-12")]).unwrap();
        assert_eq!(output.as_deref(), Some("## speed\ngame.exe 400 F4FF 0A00\n"));

        let output = render_one(&catalogue, no_verify(), &[("speed", "300")]).unwrap();
        assert_eq!(output.as_deref(), Some("## speed\ngame.exe 400 2C01\n"));
    }

    #[test]
    fn number_patch_range_is_inclusive() {
        let catalogue = catalogue(CATALOGUE);
        for value in &["-100", "1000"] {
            assert!(render_one(&catalogue, RenderOptions::default(), &[("speed", *value)]).is_ok());
        }
        for value in &["-101", "1001"] {
            let result = render_one(&catalogue, RenderOptions::default(), &[("speed", *value)]);
            match result {
                Err(error @ Error::OutOfRange { .. }) => {
                    assert!(error
                        .to_string()
                        .starts_with("number patch value out of range"));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn number_patch_rejects_non_numbers() {
        let catalogue = catalogue(CATALOGUE);
        assert!(matches!(
            render_one(&catalogue, RenderOptions::default(), &[("speed", "fast")]),
            Err(Error::InvalidNumber { .. })
        ));
    }

    #[test]
    fn no_verify_drops_every_trailing_field() {
        let catalogue = catalogue(CATALOGUE);
        let selections = [("p2", "0"), ("lang", "jp"), ("speed", "5")];

        let payload = |text: &str| -> Vec<usize> {
            text.lines()
                .filter(|line| !line.is_empty() && !line.starts_with("##"))
                .map(|line| line.trim_start_matches("# ").split(' ').count())
                .collect()
        };

        let verified = render_one(&catalogue, union_all(), &selections)
            .unwrap()
            .unwrap();
        assert!(payload(&verified).iter().all(|&fields| fields == 4));

        let options = RenderOptions {
            no_verify: true,
            union_all_options: true,
            ..RenderOptions::default()
        };
        let unverified = render_one(&catalogue, options, &selections).unwrap().unwrap();
        let fields = payload(&unverified);
        assert_eq!(fields.len(), 6);
        assert!(fields.iter().all(|&fields| fields == 3));
    }

    #[test]
    fn unknown_patches_are_skipped() {
        let catalogue = catalogue(CATALOGUE);
        let mut state = RunState::new(&catalogue);
        let renderer = Renderer::new(&catalogue, RenderOptions::default());

        let output = renderer
            .render(&profile("a.txt", &[("ghost", "1"), ("p1", "0")]), &mut state)
            .unwrap();
        assert_eq!(output.as_deref(), Some("## p1\n# game.exe 100 90 55\n"));

        let output = renderer
            .render(&profile("b.txt", &[("ghost", "1")]), &mut state)
            .unwrap();
        assert_eq!(output, None);
    }

    #[test]
    fn unmatched_patches_survive_the_run() {
        let catalogue = catalogue(CATALOGUE);
        let mut state = RunState::new(&catalogue);
        let renderer = Renderer::new(&catalogue, RenderOptions::default());

        for file in &["a.txt", "b.txt", "c.txt"] {
            renderer
                .render(&profile(file, &[("p1", "1"), ("lang", "jp"), ("p1", "0")]), &mut state)
                .unwrap();
        }
        renderer
            .render(&profile("d.txt", &[("speed", "1")]), &mut state)
            .unwrap();

        assert_eq!(state.unmatched.remaining().collect::<Vec<_>>(), vec!["p2"]);
    }

    #[test]
    fn validation_header_is_written_once_per_run() {
        let catalogue = catalogue(VALIDATED);
        let mut state = RunState::new(&catalogue);
        let renderer = Renderer::new(&catalogue, RenderOptions::default());

        let first = renderer
            .render(&profile("a.txt", &[("p1", "1")]), &mut state)
            .unwrap();
        assert_eq!(
            first.as_deref(),
            Some("# game.exe v1.02\ngame.exe 10 4D5A\n\n## p1\ngame.exe 100 90 55\n")
        );

        let second = renderer
            .render(&profile("b.txt", &[("p1", "1")]), &mut state)
            .unwrap();
        assert_eq!(second.as_deref(), Some("## p1\ngame.exe 100 90 55\n"));
    }

    #[test]
    fn first_profile_consumes_the_header_even_when_empty() {
        let catalogue = catalogue(VALIDATED);
        let mut state = RunState::new(&catalogue);
        let renderer = Renderer::new(&catalogue, RenderOptions::default());

        let first = renderer.render(&profile("a.txt", &[]), &mut state).unwrap();
        assert_eq!(first.as_deref(), Some("# game.exe v1.02\ngame.exe 10 4D5A\n"));

        let second = renderer.render(&profile("b.txt", &[]), &mut state).unwrap();
        assert_eq!(second, None);
    }

    #[test]
    fn validation_header_can_be_written_per_file() {
        let catalogue = catalogue(VALIDATED);
        let mut state = RunState::new(&catalogue);
        let options = RenderOptions {
            validation_header: ValidationHeader::Always,
            ..RenderOptions::default()
        };
        let renderer = Renderer::new(&catalogue, options);

        for file in &["a.txt", "b.txt"] {
            let output = renderer
                .render(&profile(file, &[("p1", "on")]), &mut state)
                .unwrap();
            assert_eq!(
                output.as_deref(),
                Some("# game.exe v1.02\ngame.exe 10 4D5A\n\n## p1\ngame.exe 100 90 55\n")
            );
        }

        let empty = renderer.render(&profile("c.txt", &[]), &mut state).unwrap();
        assert_eq!(empty, None);
    }
}
