//! Rendering result tables as text

use serde::Deserialize;

use crate::aggregate::{ResultTable, Row};

/// Column layout for [`format_table`]
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TableFormat {
    /// Label of the input column
    #[serde(default = "default_input_label")]
    pub input_label: String,

    /// Label of the result column
    #[serde(default = "default_result_label")]
    pub result_label: String,

    /// Decimal places of the input column
    #[serde(default = "default_input_precision")]
    pub input_precision: usize,

    /// Decimal places of the result column
    #[serde(default = "default_result_precision")]
    pub result_precision: usize,

    #[serde(default = "default_input_width")]
    pub input_width: usize,

    #[serde(default = "default_result_width")]
    pub result_width: usize,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            input_label: default_input_label(),
            result_label: default_result_label(),
            input_precision: default_input_precision(),
            result_precision: default_result_precision(),
            input_width: default_input_width(),
            result_width: default_result_width(),
        }
    }
}

fn default_input_label() -> String {
    "radius".to_string()
}
fn default_result_label() -> String {
    "area".to_string()
}
fn default_input_precision() -> usize {
    2
}
fn default_result_precision() -> usize {
    3
}
fn default_input_width() -> usize {
    6
}
fn default_result_width() -> usize {
    12
}

impl TableFormat {
    /// Header line, labels right-aligned over their columns
    pub fn header(&self) -> String {
        format!(
            " {:>iw$}  {:>rw$}  ",
            self.input_label,
            self.result_label,
            iw = self.input_width,
            rw = self.result_width,
        )
    }

    /// Separator rule under the header
    pub fn rule(&self) -> String {
        "-".repeat(self.input_width + self.result_width + 7)
    }

    /// One rendered row
    pub fn line(&self, row: &Row) -> String {
        match row {
            Row::Parsed(p) => format!(
                " {:>iw$.ip$}  {:>rw$.rp$} ",
                p.input,
                p.result,
                iw = self.input_width,
                ip = self.input_precision,
                rw = self.result_width,
                rp = self.result_precision,
            ),
            Row::Gap(g) => format!(
                " {:>iw$}  {:>rw$}   (invocation {} failed: {})",
                "--",
                "--",
                g.index,
                g.reason,
                iw = self.input_width,
                rw = self.result_width,
            ),
        }
    }
}

/// Render a table with header, rule and one line per row
pub fn format_table(table: &ResultTable, layout: &TableFormat) -> String {
    let mut out = String::new();
    out.push_str(&layout.header());
    out.push('\n');
    out.push_str(&layout.rule());
    out.push('\n');
    for row in table.rows() {
        out.push_str(&layout.line(row));
        out.push('\n');
    }
    out
}
