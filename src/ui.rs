//! Terminal table output for `list` and `search`.

use colored::*;
use std::cmp;

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

    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn print(&self) {
        if self.headers.is_empty() {
            return;
        }

        let widths = self.fit_widths();
        let rule = |left: &str, mid: &str, right: &str| {
            let mut line = String::from("  ");
            line.push_str(left);
            for (i, width) in widths.iter().enumerate() {
                line.push_str(&"─".repeat(width + 2));
                line.push_str(if i + 1 == widths.len() { right } else { mid });
            }
            line
        };

        println!("{}", rule("┌", "┬", "┐"));
        print!("  │");
        for (header, width) in self.headers.iter().zip(&widths) {
            // Manual padding: colored output carries escape codes that
            // would throw off format-width padding.
            let pad = width.saturating_sub(header.chars().count());
            print!(" {}{} │", header.bold(), " ".repeat(pad));
        }
        println!();
        println!("{}", rule("├", "┼", "┤"));

        for row in &self.rows {
            print!("  │");
            for (cell, width) in row.iter().zip(&widths) {
                let shown = console::truncate_str(cell, *width, "...");
                let pad = width.saturating_sub(console::measure_text_width(&shown));
                print!(" {}{} │", shown, " ".repeat(pad));
            }
            println!();
        }
        println!("{}", rule("└", "┴", "┘"));
    }

    /// Column widths sized to content, shrunk widest-first until the table
    /// fits the terminal.
    fn fit_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .map(|header| header.chars().count())
            .collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                // Visible width only; cells may carry color escape codes.
                *width = cmp::max(*width, console::measure_text_width(cell));
            }
        }

        let term_width = console::Term::stdout().size().1 as usize;
        let overhead = 3 + 3 * widths.len();
        let available = term_width.saturating_sub(overhead);
        let mut total: usize = widths.iter().sum();

        while total > available {
            let Some((idx, &widest)) = widths.iter().enumerate().max_by_key(|&(_, &width)| width)
            else {
                break;
            };
            if widest <= 8 {
                break;
            }
            widths[idx] = widest - 1;
            total -= 1;
        }
        widths
    }
}
