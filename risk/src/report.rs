//! Long-format VaR table and the pivots built from it
//!
//! Every VaR figure of a run is one [`VarRow`]. Report writers consume either
//! the long table directly or a [`VarPivot`]: one row per attribute, columns
//! `Iso<c>`, `Inc<c>`, `Comp<c>` for each confidence label `c`.

use crate::error::{Result, RiskError};
use crate::var::VarType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group name of the ticker-level rows
pub const POSITION_GROUP: &str = "position";

/// Attribute of portfolio-level rows
pub const TOTAL_ATTRIBUTE: &str = "total";

/// Var types shown in pivots, in column order
const PIVOT_TYPES: [VarType; 3] = [VarType::Isolated, VarType::Incremental, VarType::Component];

/// One VaR figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRow {
    /// `position` or a group dimension label
    pub group: String,
    pub var_type: VarType,
    /// Confidence label, e.g. "95"
    pub confidence: String,
    /// Ticker, group value, or `total`
    pub attribute: String,
    pub value: f64,
}

/// Canonical long-format VaR output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarTable {
    rows: Vec<VarRow>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<VarRow>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: VarRow) {
        self.rows.push(row);
    }

    /// Append one row per (attribute, value)
    pub fn extend_from_map(
        &mut self,
        group: &str,
        var_type: VarType,
        confidence: &str,
        values: &BTreeMap<String, f64>,
    ) {
        self.rows.extend(values.iter().map(|(attribute, value)| VarRow {
            group: group.to_string(),
            var_type,
            confidence: confidence.to_string(),
            attribute: attribute.clone(),
            value: *value,
        }));
    }

    pub fn append(&mut self, other: VarTable) {
        self.rows.extend(other.rows);
    }

    pub fn rows(&self) -> &[VarRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct group names in order of first appearance
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for row in &self.rows {
            if !groups.contains(&row.group) {
                groups.push(row.group.clone());
            }
        }
        groups
    }

    pub fn value(
        &self,
        group: &str,
        var_type: VarType,
        confidence: &str,
        attribute: &str,
    ) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| {
                r.group == group
                    && r.var_type == var_type
                    && r.confidence == confidence
                    && r.attribute == attribute
            })
            .map(|r| r.value)
    }

    /// Every value divided by firm NAV
    pub fn to_percent_of_nav(&self, nav: f64) -> Result<VarTable> {
        if !nav.is_finite() || nav == 0.0 {
            return Err(RiskError::DegenerateNav(nav));
        }

        Ok(Self::from_rows(
            self.rows
                .iter()
                .map(|r| VarRow {
                    value: r.value / nav,
                    ..r.clone()
                })
                .collect(),
        ))
    }

    /// Wide view of one group: attributes as rows, zero-filled
    ///
    /// Confidence labels keep their order of first appearance.
    pub fn pivot(&self, group: &str) -> VarPivot {
        let selected: Vec<&VarRow> = self
            .rows
            .iter()
            .filter(|r| r.group == group && PIVOT_TYPES.contains(&r.var_type))
            .collect();

        let mut confidences: Vec<&str> = Vec::new();
        for row in &selected {
            if !confidences.contains(&row.confidence.as_str()) {
                confidences.push(&row.confidence);
            }
        }

        let mut keys: Vec<(VarType, &str)> = Vec::new();
        for var_type in PIVOT_TYPES {
            for confidence in &confidences {
                keys.push((var_type, *confidence));
            }
        }
        let columns: Vec<String> = keys
            .iter()
            .map(|(var_type, confidence)| format!("{}{}", var_type.short_label(), confidence))
            .collect();

        let mut cells: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for row in &selected {
            let values = cells
                .entry(row.attribute.as_str())
                .or_insert_with(|| vec![0.0; keys.len()]);
            if let Some(col) = keys
                .iter()
                .position(|(t, c)| *t == row.var_type && *c == row.confidence)
            {
                values[col] = row.value;
            }
        }

        VarPivot {
            index_name: pivot_index_name(group),
            columns,
            rows: cells
                .into_iter()
                .map(|(attribute, values)| PivotRow {
                    attribute: attribute.to_string(),
                    values,
                })
                .collect(),
        }
    }

    /// Positions with the largest first component VaR column
    pub fn top_contributors(&self, n: usize) -> VarPivot {
        let mut pivot = self.pivot(POSITION_GROUP).sorted_by_component(false);
        pivot.rows.truncate(n);
        pivot.index_name = format!("Top{} VaR Contributors", n);
        pivot
    }

    /// Positions with the smallest first component VaR column
    pub fn top_diversifiers(&self, n: usize) -> VarPivot {
        let mut pivot = self.pivot(POSITION_GROUP).sorted_by_component(true);
        pivot.rows.truncate(n);
        pivot.index_name = format!("Top{} VaR Diversifiers", n);
        pivot
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn pivot_index_name(group: &str) -> String {
    if group == POSITION_GROUP {
        return "Positions".to_string();
    }
    let mut chars = group.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One attribute of a pivot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub attribute: String,
    pub values: Vec<f64>,
}

/// Wide VaR view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarPivot {
    /// Header of the attribute column, e.g. "Positions" or "Sector"
    pub index_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<PivotRow>,
}

impl VarPivot {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, attribute: &str, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.rows
            .iter()
            .find(|r| r.attribute == attribute)
            .map(|r| r.values[col])
    }

    pub fn attributes(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.attribute.as_str()).collect()
    }

    fn sorted_by_component(mut self, ascending: bool) -> Self {
        let prefix = VarType::Component.short_label();
        if let Some(col) = self.columns.iter().position(|c| c.starts_with(prefix)) {
            self.rows.sort_by(|a, b| {
                let ord = a.values[col].total_cmp(&b.values[col]);
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        self
    }
}
