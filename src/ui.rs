//! Terminal UI utilities.
//!
//! A table drawn with Unicode box characters, shrunk to the terminal width.
//! `fake module list` prints one.

use colored::*;
use std::cmp;

/// Columns never shrink below this many characters.
const MIN_COLUMN: usize = 8;

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are dropped.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let visible = strip_ansi(&single_line(cell)).chars().count();
                widths[i] = cmp::max(widths[i], visible);
            }
        }

        let overhead = 3 + 3 * self.headers.len();
        let available = max_width.saturating_sub(overhead);
        let mut total: usize = widths.iter().sum();
        while total > available {
            let Some((widest, &width)) = widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
                break;
            };
            if width <= MIN_COLUMN {
                break;
            }
            widths[widest] -= 1;
            total -= 1;
        }
        widths
    }

    /// The table as lines, fitted to `max_width` columns where possible.
    pub fn render(&self, max_width: usize) -> Vec<String> {
        if self.headers.is_empty() {
            return Vec::new();
        }
        let widths = self.column_widths(max_width);
        let border = |left: &str, mid: &str, right: &str| {
            let cells: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}", left, cells.join(mid), right)
        };
        let line = |cells: Vec<String>| {
            let mut out = String::from("  │");
            for (cell, width) in cells.iter().zip(&widths) {
                let padding = width.saturating_sub(strip_ansi(cell).chars().count());
                out.push_str(&format!(" {} {}│", cell, " ".repeat(padding)));
            }
            out
        };

        let mut lines = vec![border("┌", "┬", "┐")];
        lines.push(line(
            self.headers
                .iter()
                .zip(&widths)
                .map(|(h, w)| console::truncate_str(h, *w, "...").bold().to_string())
                .collect(),
        ));
        lines.push(border("├", "┼", "┤"));
        for row in &self.rows {
            lines.push(line(
                row.iter()
                    .zip(&widths)
                    .map(|(cell, w)| console::truncate_str(&single_line(cell), *w, "...").into_owned())
                    .collect(),
            ));
        }
        lines.push(border("└", "┴", "┘"));
        lines
    }

    pub fn print(&self) {
        let (_height, width) = console::Term::stdout().size();
        for line in self.render(width as usize) {
            println!("{}", line);
        }
    }
}

fn single_line(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            _ => c,
        })
        .collect()
}

fn strip_ansi(s: &str) -> String {
    console::strip_ansi_codes(s).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_pads_columns() {
        let mut table = Table::new(&["Module", "Packaging"]);
        table.add_row(vec!["org.x:app:1.0".to_string(), "library".to_string()]);
        table.add_row(vec!["short".to_string()]);
        let lines = table.render(120);
        assert_eq!(lines.len(), 5);
        assert_eq!(strip_ansi(&lines[1]), "  │ Module        │ Packaging │");
        assert_eq!(lines[3], "  │ org.x:app:1.0 │ library   │");
    }

    #[test]
    fn test_render_shrinks_wide_columns() {
        let mut table = Table::new(&["Directory"]);
        table.add_row(vec!["/a/very/long/path/that/does/not/fit".to_string()]);
        let lines = table.render(24);
        assert!(lines[3].contains("..."));
        assert!(console::measure_text_width(&lines[3]) <= 24);
    }
}
