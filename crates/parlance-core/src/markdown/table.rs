use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};

/// Plain-text cells of a markdown table. Rendered per layout width.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    /// Renders the table with comfy-table, at most `max_width` columns wide.
    pub fn render(&self, max_width: usize) -> Vec<String> {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(max_width.min(usize::from(u16::MAX)) as u16);

        if !self.header.is_empty() {
            table.set_header(&self.header);
        }
        for row in &self.rows {
            table.add_row(row);
        }

        table.to_string().lines().map(String::from).collect()
    }
}

/// Collects cells while a table is being parsed.
#[derive(Debug, Default)]
pub(super) struct TableBuffer {
    data: TableData,
    current_row: Vec<String>,
    current_cell: String,
    in_head: bool,
}

impl TableBuffer {
    pub(super) fn push_text(&mut self, text: &str) {
        self.current_cell.push_str(&text.replace('\n', " "));
    }

    pub(super) fn start_head(&mut self) {
        self.in_head = true;
    }

    pub(super) fn finish_cell(&mut self) {
        let cell = std::mem::take(&mut self.current_cell);
        self.current_row.push(cell.trim().to_string());
    }

    /// Ends a row. The header row arrives without a surrounding `TableRow`.
    pub(super) fn finish_row(&mut self) {
        let row = std::mem::take(&mut self.current_row);
        if self.in_head {
            self.data.header = row;
            self.in_head = false;
        } else {
            self.data.rows.push(row);
        }
    }

    pub(super) fn take(&mut self) -> TableData {
        let data = std::mem::take(&mut self.data);
        *self = Self::default();
        data
    }
}
