use tabled::{
    Table,
    settings::{
        Alignment, Modify, Style,
        format::Format,
        object::{Columns, Rows},
    },
};

/// Emoji mappings for the states reported by KubeVirt, CDI and the reconciler
pub struct EmojiFormatter;

impl EmojiFormatter {
    pub fn format_value(value: &str) -> String {
        match value.to_lowercase().trim() {
            "running" => "🟢 Running".to_string(),
            "stopped" => "⚪ Stopped".to_string(),
            "provisioning" | "starting" => "🟡 Provisioning".to_string(),
            "pending" => "🟡 Pending".to_string(),
            "scheduling" | "scheduled" => "🟡 Scheduled".to_string(),
            "importinprogress" | "cloneinprogress" => format!("⏳ {value}"),
            "bound" => "🔗 Bound".to_string(),
            "succeeded" => "✅ Succeeded".to_string(),
            "applied" => "✅ applied".to_string(),
            "skip-exists" => "⏭️ skip-exists".to_string(),
            "failed" => "❌ Failed".to_string(),
            "errorunschedulable" | "crashloopbackoff" | "errorpvcnotfound" => {
                format!("❌ {value}")
            }
            "warning" => "⚠️ Warning".to_string(),
            "normal" => "ℹ️ Normal".to_string(),
            "terminating" => "🟠 Terminating".to_string(),
            "unknown" => "❓ Unknown".to_string(),
            _ => value.to_string(),
        }
    }

    /// Apply emoji formatting to a table column by index
    pub fn apply_to_column(mut table: Table, column_index: usize) -> Table {
        table.with(
            Modify::new(Columns::new(column_index..=column_index))
                .with(Format::content(Self::format_value)),
        );
        table
    }
}

/// Centralized table theme for kubectl-like output
pub struct TableTheme;

impl TableTheme {
    /// Curved borders, uppercase headers, left aligned
    pub fn apply_default(mut table: Table) -> Table {
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Format::content(|s| s.to_uppercase())))
            .with(Modify::new(Columns::new(..)).with(Alignment::left()));
        table
    }

    /// The default theme, with the state column decorated when enabled
    pub fn apply_status(table: Table, state_column: usize, emoji: bool) -> Table {
        let table = Self::apply_default(table);
        if emoji {
            EmojiFormatter::apply_to_column(table, state_column)
        } else {
            table
        }
    }
}
