// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Skill catalog for coding agents.
//!
//! A __skill__ is a directory under `ai-docs/skills` of the configuration root
//! holding a `SKILL.md` file. The file opens with YAML frontmatter naming and
//! describing the skill:
//!
//! ```text
//! ---
//! name: review
//! description: |
//!   Review a change set
//!   against team conventions
//! ---
//! ```
//!
//! Syncing skills renders every described skill into the
//! `<skills_system priority="1">` block of `AGENTS.md` at the project root.
//! Everything outside that block is left as is.

use crate::path::Layout;

use regex::{NoExpand, Regex};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tracing::{info, instrument, warn};

/// Name of skill definition file.
pub const SKILL_FILE: &str = "SKILL.md";

/// Name of agent instruction file.
pub const AGENTS_FILE: &str = "AGENTS.md";

/// Skill directories that never hold skills.
const IGNORED_DIRS: [&str; 2] = ["other", "__pycache__"];

/// Content of freshly created agent instruction file.
const AGENTS_TEMPLATE: &str = "# AGENTS\n\n\n";

const USAGE: &str = "<usage>
When users ask you to perform tasks, check if any of the available skills below can help complete the task more effectively. Skills provide specialized capabilities and domain knowledge.

How to use skills:
- Load skill content from `ai-docs/skills/{skill-name}/SKILL.md`
- The skill content will load with detailed instructions on how to complete the task
- Base directory provided in output for resolving bundled resources (references/, scripts/, assets/)

Usage notes:
- Only use skills listed in <available_skills> below
- Do not reload a skill that is already loaded in your context
- Each skill invocation is stateless and independent
</usage>";

static SKILLS_SYSTEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<skills_system priority="1">.*?</skills_system>"#)
        .expect("valid skills system pattern")
});

// INVARIANT: Leading newline keeps the mention inside usage text from matching.
static AVAILABLE_SKILLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\n<available_skills>.*?</available_skills>")
        .expect("valid available skills pattern")
});

/// Named and described skill.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

/// Parse frontmatter of a `SKILL.md` document.
///
/// Returns nothing if document has no frontmatter or frontmatter has no
/// name. Falls back to [`parse_simple`] when frontmatter is not valid YAML.
pub fn parse_skill(document: &str) -> Option<Skill> {
    if !document.starts_with("---") {
        return None;
    }

    let mut parts = document.splitn(3, "---");
    parts.next();
    let frontmatter = parts.next()?.trim();
    parts.next()?;

    match serde_yaml::from_str::<Frontmatter>(frontmatter) {
        Ok(Frontmatter { name, description }) => Some(Skill {
            name: name?,
            description: description.unwrap_or_default(),
        }),
        Err(error) => {
            warn!("frontmatter is not valid YAML, trying simple parser: {error}");
            parse_simple(frontmatter)
        }
    }
}

/// Parse `name` and `description` keys out of YAML-like text.
///
/// Understands plain `key: value` lines and `description: |` followed by
/// indented lines, which get joined with single spaces.
pub fn parse_simple(frontmatter: &str) -> Option<Skill> {
    let mut name = None;
    let mut description = String::new();
    let mut lines = frontmatter.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("name:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("description:") {
            let value = value.trim();
            if value != "|" {
                description = value.to_string();
                continue;
            }

            let mut block = Vec::new();
            while let Some(next) = lines.next_if(|next| next.starts_with("  ") || next.starts_with('\t')) {
                block.push(next.trim());
            }
            description = block.join(" ");
        }
    }

    Some(Skill {
        name: name?,
        description,
    })
}

/// Skills found in a skills directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Scan {
    /// Skills with a description.
    pub skills: Vec<Skill>,

    /// Names of skills left out for lacking a description.
    pub undescribed: Vec<String>,
}

/// Scan skills directory for skills.
///
/// # Errors
///
/// - Return [`SkillsError::Io`] if directory cannot be read.
pub fn scan_skills(skills_dir: &Path) -> Result<Scan> {
    let mut dirs = fs::read_dir(skills_dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    dirs.sort();

    let mut scan = Scan::default();
    for dir in dirs.into_iter().filter(|dir| dir.is_dir()) {
        let dir_name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if IGNORED_DIRS.contains(&dir_name.as_str()) {
            continue;
        }

        let skill_file = dir.join(SKILL_FILE);
        if !skill_file.exists() {
            warn!("skip {dir_name}: no {SKILL_FILE}");
            continue;
        }

        let document = match fs::read_to_string(&skill_file) {
            Ok(document) => document,
            Err(error) => {
                warn!("skip {dir_name}: {error}");
                continue;
            }
        };

        match parse_skill(&document) {
            Some(skill) if skill.description.trim().is_empty() => {
                warn!("skip skill {}: empty description", skill.name);
                scan.undescribed.push(skill.name);
            }
            Some(skill) => {
                info!("found skill {}", skill.name);
                scan.skills.push(skill);
            }
            None => warn!("skip {dir_name}: incomplete frontmatter"),
        }
    }

    if !scan.undescribed.is_empty() {
        warn!(
            "{} skill(s) lack a description, add one and run skills-sync again: {:?}",
            scan.undescribed.len(),
            scan.undescribed
        );
    }

    Ok(scan)
}

/// Render `<available_skills>` element, leading newline included.
pub fn render_available_skills(skills: &[Skill]) -> String {
    let mut sorted = skills.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let inner = sorted
        .into_iter()
        .map(|skill| {
            format!(
                "\n<skill>\n<name>{}</name>\n<description>{}</description>\n\
                 <location>project</location>\n</skill>\n",
                skill.name, skill.description
            )
        })
        .collect::<String>();

    format!("\n<available_skills>{inner}\n</available_skills>")
}

/// Render full content of `<skills_system>` element.
pub fn render_skills_system(skills: &[Skill]) -> String {
    format!(
        "\n## Available Skills\n\n<!-- SKILLS_TABLE_START -->\n{USAGE}\n{}\n<!-- SKILLS_TABLE_END -->\n",
        render_available_skills(skills)
    )
}

/// Refresh skills block of an agent instruction document.
///
/// Only the skill listing is swapped when the block already has one. A block
/// without listing is rebuilt, and a missing block is appended.
pub fn update_agents(document: &str, skills: &[Skill]) -> String {
    if !SKILLS_SYSTEM.is_match(document) {
        return format!(
            "{}\n\n<skills_system priority=\"1\">{}\n</skills_system>\n",
            document.trim_end(),
            render_skills_system(skills)
        );
    }

    if AVAILABLE_SKILLS.is_match(document) {
        let listing = render_available_skills(skills);
        return AVAILABLE_SKILLS
            .replace_all(document, NoExpand(&listing))
            .into_owned();
    }

    let block = format!(
        "<skills_system priority=\"1\">{}\n</skills_system>",
        render_skills_system(skills)
    );
    SKILLS_SYSTEM
        .replace_all(document, NoExpand(&block))
        .into_owned()
}

/// Outcome of syncing skills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Scanned skills.
    pub scan: Scan,

    /// Agent instruction file that was written, if any.
    pub agents_file: Option<PathBuf>,
}

/// Render skills of configuration root into `AGENTS.md` at project root.
///
/// Nothing gets written when no described skill exists.
///
/// # Errors
///
/// - Return [`SkillsError::MissingSkillsDir`] if skills directory is missing.
/// - Return [`SkillsError::Io`] if files cannot be read or written.
#[instrument(skip(layout), level = "debug")]
pub fn sync(layout: &Layout) -> Result<SyncReport> {
    let skills_dir = layout.skills_dir();
    if !skills_dir.is_dir() {
        return Err(SkillsError::MissingSkillsDir { path: skills_dir });
    }

    info!("scan skills in {:?}", skills_dir.display());
    let scan = scan_skills(&skills_dir)?;
    if scan.skills.is_empty() {
        warn!("no described skills found");
        return Ok(SyncReport {
            scan,
            agents_file: None,
        });
    }

    let agents_file = layout.root().join(AGENTS_FILE);
    let document = if agents_file.exists() {
        fs::read_to_string(&agents_file)?
    } else {
        AGENTS_TEMPLATE.to_string()
    };
    fs::write(&agents_file, update_agents(&document, &scan.skills))?;
    info!(
        "rendered {} skill(s) into {:?}",
        scan.skills.len(),
        agents_file.display()
    );

    Ok(SyncReport {
        scan,
        agents_file: Some(agents_file),
    })
}

/// Skills error types.
#[derive(Debug, thiserror::Error)]
pub enum SkillsError {
    /// Configuration root has no skills.
    #[error(
        "skills directory {:?} does not exist, run 'driving install' first",
        path.display()
    )]
    MissingSkillsDir { path: PathBuf },

    /// File system failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SkillsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    fn skill(name: &str, description: &str) -> Skill {
        Skill {
            name: name.into(),
            description: description.into(),
        }
    }

    #[test_case(
        "---\nname: review\ndescription: Review changes\n---\nbody",
        Some(skill("review", "Review changes"));
        "plain yaml"
    )]
    #[test_case(
        "---\nname: review\ndescription: |-\n  line one\n  line two\n---\n",
        Some(skill("review", "line one\nline two"));
        "yaml block scalar"
    )]
    #[test_case(
        "---\nname: odd: colon\ndescription: |\n  one\n\ttwo\n---\n",
        Some(skill("odd: colon", "one two"));
        "simple parser fallback"
    )]
    #[test_case("---\ndescription: nameless\n---\n", None; "no name")]
    #[test_case("# no frontmatter", None; "no frontmatter")]
    #[test_case("---\nname: open", None; "unterminated")]
    #[test]
    fn parse_skill_frontmatter(document: &str, expect: Option<Skill>) {
        pretty_assertions::assert_eq!(parse_skill(document), expect);
    }

    #[test]
    fn update_agents_appends_missing_block() {
        let result = update_agents("# AGENTS\n\nKeep me.\n\n", &[skill("b", "B"), skill("a", "A")]);
        assert!(result.starts_with("# AGENTS\n\nKeep me.\n\n<skills_system priority=\"1\">\n## Available Skills"));
        assert!(result.ends_with("<!-- SKILLS_TABLE_END -->\n\n</skills_system>\n"));
        let a = result.find("<name>a</name>").unwrap();
        let b = result.find("<name>b</name>").unwrap();
        assert!(a < b);
        assert!(result.contains(USAGE));
    }

    #[test]
    fn update_agents_swaps_listing_only() {
        let document = indoc! {r#"
            # AGENTS

            <skills_system priority="1">
            custom usage mentions <available_skills> inline
            <available_skills>
            <skill>
            <name>old</name>
            </skill>
            </available_skills>
            </skills_system>

            Footer stays.
        "#};
        let result = update_agents(document, &[skill("new", "cost $1 or $2")]);
        let expect = indoc! {r#"
            # AGENTS

            <skills_system priority="1">
            custom usage mentions <available_skills> inline
            <available_skills>
            <skill>
            <name>new</name>
            <description>cost $1 or $2</description>
            <location>project</location>
            </skill>

            </available_skills>
            </skills_system>

            Footer stays.
        "#};
        assert_eq!(result, expect);
    }

    #[test]
    fn update_agents_rebuilds_block_without_listing() {
        let document = "intro\n<skills_system priority=\"1\">stale</skills_system>\noutro\n";
        let result = update_agents(document, &[skill("a", "A")]);
        assert!(result.starts_with("intro\n<skills_system priority=\"1\">\n## Available Skills"));
        assert!(result.ends_with("</skills_system>\noutro\n"));
        assert!(!result.contains("stale"));
    }

    #[sealed_test]
    fn sync_renders_described_skills() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        fs::write(root.join("gitlist.json"), "[]")?;
        let skills = root.join("ai-docs/skills");
        for (dir, document) in [
            ("review", "---\nname: review\ndescription: Review code\n---\n"),
            ("draft", "---\nname: draft\ndescription: \"\"\n---\n"),
            ("other", "---\nname: other\ndescription: ignored\n---\n"),
        ] {
            fs::create_dir_all(skills.join(dir))?;
            fs::write(skills.join(dir).join(SKILL_FILE), document)?;
        }
        fs::create_dir_all(skills.join("no-skill-file"))?;

        let report = sync(&Layout::discover(&root))?;
        assert_eq!(report.scan.skills, vec![skill("review", "Review code")]);
        assert_eq!(report.scan.undescribed, vec!["draft".to_string()]);
        assert_eq!(report.agents_file, Some(root.join(AGENTS_FILE)));

        let agents = fs::read_to_string(root.join(AGENTS_FILE))?;
        assert!(agents.starts_with("# AGENTS\n\n<skills_system priority=\"1\">"));
        assert!(agents.contains("<name>review</name>\n<description>Review code</description>"));
        assert!(!agents.contains("<name>other</name>"));

        Ok(())
    }

    #[sealed_test]
    fn sync_needs_skills_dir() -> anyhow::Result<()> {
        let root = std::env::current_dir()?;
        fs::write(root.join("gitlist.json"), "[]")?;
        let result = sync(&Layout::discover(&root));
        assert!(matches!(result, Err(SkillsError::MissingSkillsDir { .. })));
        Ok(())
    }
}
