//! Doctor command handler
//!
//! Handles `fake doctor`: reports the tools and directories a build needs.

use colored::*;
use std::path::Path;

use crate::session::Session;

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub subject: String,
    pub ok: bool,
    pub detail: String,
}

fn probe(session: &Session, subject: &str, program: &str, flag: &str, cwd: &Path) -> Finding {
    match session.runner().run(program, &[flag.to_string()], cwd) {
        Ok(output) if output.success => {
            let version = output
                .diagnostics()
                .lines()
                .next()
                .unwrap_or(program)
                .trim()
                .to_string();
            Finding { subject: subject.to_string(), ok: true, detail: version }
        }
        Ok(output) => Finding {
            subject: subject.to_string(),
            ok: false,
            detail: format!("{} exited with {}", program, output.status),
        },
        Err(_) => Finding {
            subject: subject.to_string(),
            ok: false,
            detail: format!("{} not found", program),
        },
    }
}

/// Checks the compilers and the local repository without changing anything.
pub fn diagnose(session: &Session, cwd: &Path) -> Vec<Finding> {
    let config = session.config();
    let mut findings = vec![
        probe(session, "Compiler", &config.build.compiler, "-version", cwd),
        probe(session, "C compiler", &session.native().cc, "--version", cwd),
    ];

    let repository = config.resolver.local_repository();
    let writable = std::fs::metadata(&repository)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false);
    findings.push(Finding {
        subject: "Local repository".to_string(),
        ok: writable || !repository.exists(),
        detail: repository.display().to_string(),
    });

    let rule_file = cwd.join(&config.build.rule_file);
    findings.push(Finding {
        subject: "Rule file".to_string(),
        ok: rule_file.is_file(),
        detail: rule_file.display().to_string(),
    });
    findings
}

/// Run the `fake doctor` command
pub fn run_doctor(session: &Session, cwd: &Path) {
    println!("{} Running System Doctor...", "🚑".red());
    println!("-------------------------------");
    println!(
        "OS: {} ({})",
        std::env::consts::OS.green(),
        std::env::consts::ARCH.cyan()
    );

    for finding in diagnose(session, cwd) {
        let mark = if finding.ok { "✓".green() } else { "x".red() };
        println!("{} {}: {}", mark, finding.subject, finding.detail);
    }

    let resolver = &session.config().resolver;
    if resolver.offline {
        println!("{} Offline: repositories will not be contacted", "!".yellow());
    } else {
        for repository in &resolver.repositories {
            println!("{} Repository: {}", "→".cyan(), repository);
        }
    }
}
