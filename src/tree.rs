//! Dependency tree visualization.
//!
//! This module renders the resolved dependencies of a module as an ASCII
//! tree, the way `fake module tree` prints it.
//!
//! ## Example Output
//!
//! ```text
//! org.x:app:1.0
//! ├── org.x:lib:1.0 (source)
//! │   └── junit:junit:4.8.1
//! └── junit:junit:4.8.1 (*)
//! ```
//!
//! A `(*)` marks a module whose dependencies were already shown.

use crate::error::Result;
use crate::maven::{DescriptorId, Resolver};
use colored::*;
use std::collections::HashSet;

const EXCLUDED_SCOPES: &[&str] = &["test"];

/// The tree below `id`, one line per edge, without colors.
pub fn render_tree(resolver: &mut Resolver, id: DescriptorId) -> Result<Vec<String>> {
    let mut lines = vec![resolver.descriptor(id).coordinate.to_string()];
    let mut expanded = HashSet::from([id]);
    render_children(resolver, id, "", &mut expanded, &mut lines)?;
    Ok(lines)
}

fn render_children(
    resolver: &mut Resolver,
    id: DescriptorId,
    indent: &str,
    expanded: &mut HashSet<DescriptorId>,
    lines: &mut Vec<String>,
) -> Result<()> {
    let children = resolver.direct_dependencies(id, true, EXCLUDED_SCOPES)?;
    let count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let is_last = i == count - 1;
        let prefix = if is_last { "└──" } else { "├──" };
        let descriptor = resolver.descriptor(child);
        let mut line = format!("{}{} {}", indent, prefix, descriptor.coordinate);
        if descriptor.from_source {
            line.push_str(" (source)");
        }
        let first_visit = expanded.insert(child);
        if !first_visit {
            line.push_str(" (*)");
        }
        lines.push(line);

        if first_visit {
            let child_indent = format!("{}{}", indent, if is_last { "    " } else { "│   " });
            render_children(resolver, child, &child_indent, expanded, lines)?;
        }
    }
    Ok(())
}

pub fn print_tree(resolver: &mut Resolver, id: DescriptorId) -> Result<()> {
    let lines = render_tree(resolver, id)?;
    let mut lines = lines.into_iter();
    if let Some(root) = lines.next() {
        println!("{}", root.bold().cyan());
    }
    let mut empty = true;
    for line in lines {
        empty = false;
        println!("{}", line);
    }
    if empty {
        println!("└── (no dependencies)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::maven::HttpTransport;
    use std::fs;
    use std::sync::Arc;

    fn module(dir: &std::path::Path, name: &str, deps: &[&str]) {
        let module_dir = dir.join(name);
        fs::create_dir_all(module_dir.join("src/main/java")).unwrap();
        let deps: String = deps
            .iter()
            .map(|d| {
                format!(
                    "<dependency><groupId>org.x</groupId><artifactId>{}</artifactId>\
                     <version>1.0</version></dependency>",
                    d
                )
            })
            .collect();
        fs::write(
            module_dir.join("pom.xml"),
            format!(
                "<project><parent><groupId>org.x</groupId><artifactId>parent</artifactId>\
                 <version>1.0</version></parent><artifactId>{}</artifactId>\
                 <dependencies>{}</dependencies></project>",
                name, deps
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_render_tree_marks_repeated_modules() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pom.xml"),
            "<project><groupId>org.x</groupId><artifactId>parent</artifactId>\
             <version>1.0</version><packaging>pom</packaging>\
             <modules><module>app</module><module>lib</module><module>core</module></modules>\
             </project>",
        )
        .unwrap();
        module(dir.path(), "core", &[]);
        module(dir.path(), "lib", &["core"]);
        module(dir.path(), "app", &["lib", "core"]);

        let config = ResolverConfig {
            local_repository: Some(dir.path().join("m2")),
            repositories: Vec::new(),
            offline: true,
            ..Default::default()
        };
        let mut resolver = Resolver::new(config, Arc::new(HttpTransport::default()));
        let app = resolver.parse(&dir.path().join("app")).unwrap();
        let lines = render_tree(&mut resolver, app).unwrap();
        assert_eq!(
            lines,
            [
                "org.x:app:1.0",
                "├── org.x:lib:1.0 (source)",
                "│   └── org.x:core:1.0 (source)",
                "└── org.x:core:1.0 (source) (*)",
            ]
        );
    }
}
