//! Model Diagnostics
//!
//! Integrity problems found while realizing collections are recorded here
//! instead of failing the enumeration. `EdmxModel::diagnose` adds a full
//! integrity pass on top.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{EdmxModel, ObjectKind, Section};

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Enumeration ===
    /// Element has no name attribute
    MissingName,
    /// A later element repeats an earlier name
    DuplicateName,
    /// Required reference does not resolve
    UnresolvedReference,
    /// Association without exactly two ends
    MalformedAssociation,

    // === Integrity pass ===
    /// Key `PropertyRef` names no declared property
    DanglingKeyReference,
    /// Both ends of an association use the same role
    DuplicateRole,
    /// BaseType chain loops
    InheritanceCycle,
    /// Root entity type without a key
    MissingKey,
    /// Conceptual entity set with no entity set mapping
    UnmappedEntitySet,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingName => "E001",
            Self::DuplicateName => "E002",
            Self::UnresolvedReference => "E003",
            Self::MalformedAssociation => "E004",
            Self::DanglingKeyReference => "E005",
            Self::DuplicateRole => "E006",
            Self::InheritanceCycle => "E007",
            Self::MissingKey => "W001",
            Self::UnmappedEntitySet => "I001",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingName
            | Self::DuplicateName
            | Self::UnresolvedReference
            | Self::MalformedAssociation
            | Self::DanglingKeyReference
            | Self::DuplicateRole
            | Self::InheritanceCycle => Severity::Error,

            Self::MissingKey => Severity::Warning,

            Self::UnmappedEntitySet => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Kind of the offending object
    pub kind: ObjectKind,
    /// Name as written in the document (may be empty)
    pub name: String,
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Additional context (section, related objects)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(kind: ObjectKind, name: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({} '{}')",
            self.code,
            self.code.severity(),
            self.message,
            self.kind,
            self.name
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of model diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items with a given code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(move |i| i.code == code)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if !self.is_empty() {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// =============================================================================
// Integrity pass
// =============================================================================

impl EdmxModel {
    /// Problems recorded while realizing collections so far
    pub fn model_errors(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Realize every collection and check cross-object integrity
    pub fn diagnose(&mut self) -> Diagnostics {
        self.realize_all();
        let mut report = self.diagnostics.clone();

        for section in [Section::Conceptual, Section::Storage] {
            for entity_type in self.entity_types(section) {
                let name = self.full_name(entity_type);
                let is_root = self.base_type(entity_type).is_none();
                let keys = self.key_names(entity_type);
                if is_root && keys.is_empty() && !self.has_base_type_attribute(entity_type) {
                    report.push(DiagnosticItem::new(
                        ObjectKind::EntityType,
                        name.as_str(),
                        DiagnosticCode::MissingKey,
                        "entity type declares no key",
                    ));
                }
                for key in keys {
                    if self.property(entity_type, &key).is_none() {
                        report.push(
                            DiagnosticItem::new(
                                ObjectKind::EntityType,
                                name.as_str(),
                                DiagnosticCode::DanglingKeyReference,
                                format!("key refers to unknown property '{}'", key),
                            )
                            .with_context(format!("section: {}", section)),
                        );
                    }
                }
            }

            for association in self.associations(section) {
                let ends = self.association_ends(association);
                if ends.len() == 2 && super::resolve::names_match(&ends[0].role, &ends[1].role) {
                    report.push(DiagnosticItem::new(
                        ObjectKind::Association,
                        self.full_name(association),
                        DiagnosticCode::DuplicateRole,
                        format!("both ends use role '{}'", ends[0].role),
                    ));
                }
            }
        }

        for cycle in self.inheritance_cycles() {
            let names: Vec<String> = cycle.iter().map(|t| self.full_name(*t)).collect();
            report.push(
                DiagnosticItem::new(
                    ObjectKind::EntityType,
                    names.first().cloned().unwrap_or_default(),
                    DiagnosticCode::InheritanceCycle,
                    "BaseType chain forms a cycle",
                )
                .with_context(format!("Cycle: {}", names.join(" -> "))),
            );
        }

        for set in self.entity_sets(Section::Conceptual) {
            if self.entity_set_mapping_of(set).is_none() {
                report.push(DiagnosticItem::new(
                    ObjectKind::EntitySet,
                    self.full_name(set),
                    DiagnosticCode::UnmappedEntitySet,
                    "entity set has no mapping",
                ));
            }
        }

        report
    }

    /// Enumerate every collection of the document once
    fn realize_all(&mut self) {
        for section in [Section::Conceptual, Section::Storage] {
            for entity_type in self.entity_types(section) {
                self.properties(entity_type);
                self.navigation_properties(entity_type);
            }
            self.entity_sets(section);
            self.associations(section);
            self.association_sets(section);
        }
        for function in self.functions() {
            self.parameters(function);
        }
        for import in self.function_imports() {
            self.parameters(import);
        }
        for set_mapping in self.entity_set_mappings() {
            for type_mapping in self.entity_type_mappings(set_mapping) {
                for fragment in self.mapping_fragments(type_mapping) {
                    self.scalar_property_mappings(fragment);
                    self.conditions(fragment);
                }
            }
        }
        self.association_set_mappings();
        self.function_import_mappings();
        self.shapes();
        self.connectors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::DuplicateName.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::MissingKey.severity(), Severity::Warning);
        assert_eq!(DiagnosticCode::UnmappedEntitySet.severity(), Severity::Info);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.push(DiagnosticItem::new(
            ObjectKind::EntitySet,
            "Orders",
            DiagnosticCode::UnresolvedReference,
            "entity type 'Self.Order' not found",
        ));
        diags.push(DiagnosticItem::new(
            ObjectKind::EntityType,
            "Model.Log",
            DiagnosticCode::MissingKey,
            "entity type declares no key",
        ));

        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.has_errors());
        assert_eq!(diags.with_code(DiagnosticCode::MissingKey).count(), 1);
    }

    #[test]
    fn test_display_includes_subject_and_context() {
        let item = DiagnosticItem::new(ObjectKind::Association, "FK_Orders", DiagnosticCode::MalformedAssociation, "three ends")
            .with_context("section: storage");
        let text = item.to_string();
        assert!(text.starts_with("[E004] error: three ends (Association 'FK_Orders')"));
        assert!(text.contains("\n  - section: storage"));
    }
}
