use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories whose sources are not ours to police.
const SKIPPED_DIRS: &[&str] = &["./target", "./examples"];

// Directories cargo should watch so the scan reruns when sources move.
const WATCHED_DIRS: &[&str] = &["model", "cli", "tests", "benches"];

// Which part of a matching line a rule actually cares about.
#[derive(Clone, Copy)]
enum Scope {
    // Code outside comments and string literals.
    Code,
    // Anywhere the pattern matched.
    Anywhere,
    // Comments, except `///` doc comments.
    PlainComment,
    // Comments whose letters are all uppercase.
    ShoutingComment,
}

struct Rule {
    name: &'static str,
    pattern: &'static str,
    scope: Scope,
    // Whether build.rs itself is scanned; its own patterns would match.
    scan_build_script: bool,
    advice: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        name: "underscore-prefixed identifiers",
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        scope: Scope::Code,
        scan_build_script: true,
        advice: "Underscore-prefixed names are not allowed in this project.\n   Either use the binding (removing the underscore) or remove it completely.",
    },
    Rule {
        name: "forbidden comment markers",
        pattern: r"(//|/\*|///).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        scope: Scope::Anywhere,
        scan_build_script: false,
        advice: "Comments must describe the code as it is, not its edit history.\n   Remove these comments rather than commenting them out.",
    },
    Rule {
        name: "'**' in plain comments",
        pattern: r"(//|/\*).*\*\*",
        scope: Scope::PlainComment,
        scan_build_script: false,
        advice: "The '**' pattern is only allowed in doc comments.",
    },
    Rule {
        name: "all-uppercase comments",
        pattern: r"(//|/\*|///).*",
        scope: Scope::ShoutingComment,
        scan_build_script: false,
        advice: "Comments where every letter is uppercase are not allowed.\n   Strongly consider deleting the comment completely.",
    },
    Rule {
        name: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        scope: Scope::Anywhere,
        scan_build_script: false,
        advice: "Either use the code (removing the attribute) or remove it completely.",
    },
];

// Collects the lines of one file that violate one rule.
struct RuleCollector<'a> {
    rule: &'a Rule,
    violations: Vec<String>,
}

impl Sink for RuleCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if violates(self.rule.scope, line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn violates(scope: Scope, line: &str) -> bool {
    let trimmed = line.trim_start();
    match scope {
        Scope::Anywhere => true,
        Scope::Code => !is_comment(line) && !underscore_only_in_strings(line),
        Scope::PlainComment => !trimmed.starts_with("///"),
        Scope::ShoutingComment => comment_text(line).is_some_and(|text| {
            let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
            letters.peek().is_some() && letters.all(char::is_uppercase)
        }),
    }
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with("//")
        || (line.contains("/*") && !line.contains("*/match") && !line.contains("*/let"))
}

// True when every quoted segment holds the underscore, i.e. the match sits
// inside a string literal rather than in code.
fn underscore_only_in_strings(line: &str) -> bool {
    line.contains('"')
        && line
            .split('"')
            .enumerate()
            .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("///") {
        return Some(rest.trim());
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim());
    }
    let start = line.find("/*")? + 2;
    let body = &line[start..];
    Some(body.find("*/").map_or(body, |end| &body[..end]).trim())
}

fn rust_sources() -> Vec<PathBuf> {
    WalkDir::new(".")
        .into_iter()
        .filter_entry(|e| !SKIPPED_DIRS.iter().any(|dir| e.path() == Path::new(dir)))
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check_rule(rule: &Rule, sources: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
    let mut searcher = Searcher::new();

    for path in sources {
        if !rule.scan_build_script && path.file_name().is_some_and(|name| name == "build.rs") {
            continue;
        }
        let mut collector = RuleCollector {
            rule,
            violations: Vec::new(),
        };
        searcher.search_path(&matcher, path, &mut collector)?;
        if collector.violations.is_empty() {
            continue;
        }

        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            collector.violations.len(),
            rule.name,
            path.display()
        );
        for violation in &collector.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", rule.advice));
        return Err(error_msg.into());
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in WATCHED_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    let sources = rust_sources();
    for rule in RULES {
        // The `eprintln!` is what shows the report in cargo's output.
        if let Err(e) = check_rule(rule, &sources) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
