use crate::domain::model::{ProjectedRow, RawRecord};

/// One output column and the upstream keys that may feed it, in priority
/// order. The first key is the primary source, the rest are aliases seen in
/// other record shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub title: &'static str,
    pub source_keys: &'static [&'static str],
}

pub const COMMISSIONING_DATE: &str = "InbetriebnahmeDatum";

pub const MASTR_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        title: "MaStRNummer",
        source_keys: &["MaStRNummer", "MaStR-Nummer der Einheit"],
    },
    ColumnSpec {
        title: "Betreiber",
        source_keys: &["Anlagenbetreiber (Name)", "AnlagenbetreiberName"],
    },
    ColumnSpec {
        title: "Energietraeger",
        source_keys: &["Energieträger", "EnergietraegerName"],
    },
    ColumnSpec {
        title: "Bruttoleistung",
        source_keys: &["Bruttoleistung", "Bruttoleistung der Einheit"],
    },
    ColumnSpec {
        title: "Nettonennleistung",
        source_keys: &["Nettonennleistung", "Nettonennleistung der Einheit"],
    },
    ColumnSpec {
        title: "Bundesland",
        source_keys: &["Bundesland"],
    },
    ColumnSpec {
        title: "PLZ",
        source_keys: &["Plz", "Postleitzahl"],
    },
    ColumnSpec {
        title: "Ort",
        source_keys: &["Ort"],
    },
    ColumnSpec {
        title: COMMISSIONING_DATE,
        source_keys: &[
            "Inbetriebnahmedatum der Einheit",
            "InbetriebnahmeDatum",
            "EegInbetriebnahmeDatum",
        ],
    },
];

#[derive(Debug, Clone, Copy)]
pub struct RowProjector {
    columns: &'static [ColumnSpec],
}

impl Default for RowProjector {
    fn default() -> Self {
        Self::new(MASTR_COLUMNS)
    }
}

impl RowProjector {
    pub fn new(columns: &'static [ColumnSpec]) -> Self {
        Self { columns }
    }

    pub fn titles(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().map(|c| c.title)
    }

    /// Upstream keys feeding `title`, empty if the column is unknown.
    pub fn source_keys(&self, title: &str) -> &'static [&'static str] {
        self.columns
            .iter()
            .find(|c| c.title == title)
            .map(|c| c.source_keys)
            .unwrap_or(&[])
    }

    pub fn project(&self, record: &RawRecord) -> ProjectedRow {
        let cells = self
            .columns
            .iter()
            .map(|column| {
                let value = column
                    .source_keys
                    .iter()
                    .filter_map(|key| record.get(*key))
                    .find(|v| !v.is_null())
                    .map(cell_text)
                    .unwrap_or_default();
                (column.title, value)
            })
            .collect();
        ProjectedRow::from_cells(cells)
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
