//! Field selections and declared field contracts.

use crate::envelope::METADATA_FIELD;
use crate::error::Error;
use std::collections::BTreeSet;

/// Declares the complete set of fields a record type may carry.
///
/// Usually derived with `#[derive(FieldContract)]` from `fieldseal-derive`.
pub trait FieldContract {
    /// Field names as they appear in the serialized record.
    const FIELDS: &'static [&'static str];
}

/// The set of field names to encrypt.
///
/// Names are distinct and kept in sorted order so iteration is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelection {
    names: BTreeSet<String>,
}

impl FieldSelection {
    /// Creates a selection from field names.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSelection` if a name is empty, repeated, or is
    /// the reserved metadata field.
    pub fn new<I, S>(names: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected = BTreeSet::new();
        for name in names {
            let name = name.into();
            if name.is_empty() {
                return Err(Error::InvalidSelection("field name must not be empty".to_string()));
            }
            if name == METADATA_FIELD {
                return Err(Error::InvalidSelection(format!(
                    "`{METADATA_FIELD}` is reserved for envelope metadata"
                )));
            }
            if !selected.insert(name.clone()) {
                return Err(Error::InvalidSelection(format!("field `{name}` selected twice")));
            }
        }
        Ok(Self { names: selected })
    }

    /// Creates a selection validated against the declared fields of `T`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSelection` if any name is not part of
    /// `T::FIELDS`, or for the reasons listed on [`FieldSelection::new`].
    pub fn for_contract<T, I, S>(names: I) -> Result<Self, Error>
    where
        T: FieldContract,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selection = Self::new(names)?;
        selection.check_contract(T::FIELDS)?;
        Ok(selection)
    }

    /// Verifies that every selected name appears in `declared`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSelection` naming the first undeclared field.
    pub fn check_contract(&self, declared: &[&str]) -> Result<(), Error> {
        match self.names.iter().find(|name| !declared.contains(&name.as_str())) {
            Some(name) => Err(Error::InvalidSelection(format!(
                "field `{name}` is not declared by the record type"
            ))),
            None => Ok(()),
        }
    }

    /// Iterates over the selected names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Returns `true` if `name` is selected.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of selected names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
