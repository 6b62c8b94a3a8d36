use nugetsearch_icons::CacheEntry;
use nugetsearch_icons::fetch::{Icon, ImageFormat};
use prettytable::format::consts::FORMAT_CLEAN;
use prettytable::{Table, row};

/// The outcome of loading one icon, as printed by the `fetch` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconRow {
    pub url: String,
    pub status: String,
    pub format: Option<ImageFormat>,
    pub bytes: Option<usize>,
}

impl IconRow {
    /// Describes `entry`, where `None` means the icon never finished loading.
    pub fn new(url: String, entry: Option<CacheEntry<Icon>>) -> Self {
        let (status, format, bytes) = match entry {
            Some(Ok(icon)) => ("ok".to_owned(), Some(icon.format), Some(icon.data.len())),
            Some(Err(error)) => (error.to_string(), None, None),
            None => ("pending".to_owned(), None, None),
        };
        Self {
            url,
            status,
            format,
            bytes,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.format.is_some()
    }
}

fn build_table(rows: &[IconRow]) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.set_titles(row![b => "URL", "Status", "Format", "Bytes"]);

    for icon in rows {
        let format = icon.format.map(|f| f.to_string()).unwrap_or_default();
        let bytes = icon.bytes.map(|b| b.to_string()).unwrap_or_default();
        table.add_row(row![icon.url, icon.status, format, r->bytes]);
    }

    table
}

pub fn print_table(rows: &[IconRow]) {
    build_table(rows).printstd();
}
