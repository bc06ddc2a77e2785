//! Auxiliary field metadata (`label`, `blurb`, ranges, UI hints).
//!
//! The key set is closed. Which keys a field accepts, and which get a default
//! value when left out, depends on the storage class of the field's type.
//! Only int, float and string fields take metadata at all.

use super::info::Storage;
use crate::error::DefinitionError;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxKey {
    Label,
    Blurb,
    Default,
    Min,
    Max,
    Step,
    Hints,
}

const NUMERIC_KEYS: &[AuxKey] = &[
    AuxKey::Label,
    AuxKey::Blurb,
    AuxKey::Default,
    AuxKey::Min,
    AuxKey::Max,
    AuxKey::Step,
    AuxKey::Hints,
];
const STRING_KEYS: &[AuxKey] = &[AuxKey::Label, AuxKey::Blurb, AuxKey::Default, AuxKey::Hints];

impl AuxKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuxKey::Label => "label",
            AuxKey::Blurb => "blurb",
            AuxKey::Default => "default",
            AuxKey::Min => "min",
            AuxKey::Max => "max",
            AuxKey::Step => "step",
            AuxKey::Hints => "hints",
        }
    }

    pub fn parse(key: &str) -> Option<AuxKey> {
        match key {
            "label" => Some(AuxKey::Label),
            "blurb" => Some(AuxKey::Blurb),
            "default" => Some(AuxKey::Default),
            "min" => Some(AuxKey::Min),
            "max" => Some(AuxKey::Max),
            "step" => Some(AuxKey::Step),
            "hints" => Some(AuxKey::Hints),
            _ => None,
        }
    }

    /// Keys accepted for a storage class, in positional order. Empty for
    /// classes that take no metadata.
    pub fn recognized_for(storage: Storage) -> &'static [AuxKey] {
        match storage {
            Storage::Int | Storage::Float => NUMERIC_KEYS,
            Storage::String => STRING_KEYS,
            _ => &[],
        }
    }

    fn filled_default(&self, storage: Storage) -> Option<&'static str> {
        match (self, storage) {
            (AuxKey::Default, Storage::Int | Storage::Float) => Some("0"),
            _ => None,
        }
    }
}

impl fmt::Display for AuxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn recognized(storage: Storage) -> Result<&'static [AuxKey], DefinitionError> {
    match AuxKey::recognized_for(storage) {
        [] => Err(DefinitionError::NoAuxData {
            kind: storage.as_str(),
        }),
        keys => Ok(keys),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuxData {
    entries: BTreeMap<AuxKey, String>,
}

impl AuxData {
    /// Assign arguments to the recognized keys in order, then fill defaults
    /// for the keys left over.
    pub fn from_positional<S: AsRef<str>>(
        storage: Storage,
        args: &[S],
    ) -> Result<Self, DefinitionError> {
        let keys = recognized(storage)?;
        if args.len() > keys.len() {
            return Err(DefinitionError::TooManyAuxArgs {
                kind: storage.as_str(),
                given: args.len(),
                max: keys.len(),
            });
        }

        let mut entries = BTreeMap::new();
        for (key, value) in keys.iter().zip(args) {
            entries.insert(*key, value.as_ref().to_string());
        }
        let mut aux = AuxData { entries };
        aux.fill_defaults(storage);
        Ok(aux)
    }

    pub fn from_pairs<'a, I>(storage: Storage, pairs: I) -> Result<Self, DefinitionError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let recognized = recognized(storage)?;
        let mut entries = BTreeMap::new();
        for (key, value) in pairs {
            let parsed = AuxKey::parse(key)
                .filter(|k| recognized.contains(k))
                .ok_or_else(|| DefinitionError::InvalidAuxKey {
                    key: key.to_string(),
                    kind: storage.as_str(),
                })?;
            entries.insert(parsed, value.to_string());
        }
        let mut aux = AuxData { entries };
        aux.fill_defaults(storage);
        Ok(aux)
    }

    fn fill_defaults(&mut self, storage: Storage) {
        for key in AuxKey::recognized_for(storage) {
            if let Some(default) = key.filled_default(storage) {
                self.entries
                    .entry(*key)
                    .or_insert_with(|| default.to_string());
            }
        }
    }

    pub fn get(&self, key: AuxKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn get_f64(&self, key: AuxKey) -> Option<f64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (AuxKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_numeric_fills_default() {
        let aux = AuxData::from_positional(Storage::Int, &["Width", "Width in pixels"]).unwrap();
        assert_eq!(aux.get(AuxKey::Label), Some("Width"));
        assert_eq!(aux.get(AuxKey::Blurb), Some("Width in pixels"));
        assert_eq!(aux.get(AuxKey::Default), Some("0"));
        assert_eq!(aux.get(AuxKey::Min), None);
    }

    #[test]
    fn test_positional_assigns_in_order() {
        let aux =
            AuxData::from_positional(Storage::Float, &["Zoom", "", "1.5", "0.1", "10", "0.1"])
                .unwrap();
        assert_eq!(aux.get_f64(AuxKey::Default), Some(1.5));
        assert_eq!(aux.get_f64(AuxKey::Max), Some(10.0));
        assert_eq!(aux.get(AuxKey::Hints), None);
    }

    #[test]
    fn test_string_has_no_filled_default() {
        let aux = AuxData::from_positional(Storage::String, &["Title"]).unwrap();
        assert_eq!(aux.get(AuxKey::Default), None);
        assert_eq!(aux.len(), 1);
    }

    #[test]
    fn test_too_many_positional_args() {
        let err = AuxData::from_positional(Storage::String, &["a", "b", "c", "d", "e"]).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::TooManyAuxArgs {
                kind: "string",
                given: 5,
                max: 4
            }
        );
    }

    #[test]
    fn test_pairs_reject_unknown_and_unrecognized_keys() {
        let err = AuxData::from_pairs(Storage::Int, [("colour", "red")]).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidAuxKey { .. }));

        // min is a real key, but not for strings
        let err = AuxData::from_pairs(Storage::String, [("min", "0")]).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidAuxKey { kind: "string", .. }));
    }

    #[test]
    fn test_kinds_without_metadata_are_rejected() {
        let kinds = [
            Storage::Bool,
            Storage::Enum,
            Storage::Record,
            Storage::Sequence,
            Storage::Interface,
            Storage::Any,
        ];
        for storage in kinds {
            let err = AuxData::from_positional(storage, &["Label"]).unwrap_err();
            assert_eq!(err, DefinitionError::NoAuxData { kind: storage.as_str() });
            let err = AuxData::from_pairs(storage, [("label", "Label")]).unwrap_err();
            assert_eq!(err, DefinitionError::NoAuxData { kind: storage.as_str() });
            assert!(AuxKey::recognized_for(storage).is_empty());
        }
    }

    #[test]
    fn test_pairs_keep_explicit_default() {
        let aux = AuxData::from_pairs(Storage::Int, [("default", "7"), ("hints", "rw")]).unwrap();
        assert_eq!(aux.get(AuxKey::Default), Some("7"));
        let keys: Vec<AuxKey> = aux.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![AuxKey::Default, AuxKey::Hints]);
    }
}
