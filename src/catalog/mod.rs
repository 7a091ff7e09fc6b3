//! Read-only sign dictionary.
//!
//! The catalog is a flat JSON object of `label -> definition`. Entries keep
//! document order, and the matcher resolves equal scores in favour of the
//! earlier entry, so reordering a catalog file can change which of two tied
//! signs is reported.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::features::{HandShape, PalmOrientation};
use crate::motion::{Direction, MotionType};

const DEFAULT_SIGNS: &str = include_str!("assets/default_signs.json");

/// Expected handshape. Absent fields are not compared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingers: Option<[bool; 5]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<HandShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palm: Option<PalmOrientation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionPattern {
    pub motion: MotionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignKind {
    Static {
        hand: HandPattern,
    },
    Dynamic {
        #[serde(default)]
        hand: Option<HandPattern>,
        motion: MotionPattern,
    },
    /// Needs both hands. Without a motion pattern it is matched as a held pose.
    TwoHanded {
        #[serde(default)]
        hand: Option<HandPattern>,
        #[serde(default)]
        motion: Option<MotionPattern>,
    },
    Facial {
        #[serde(default)]
        hand: Option<HandPattern>,
        expression: String,
    },
}

impl SignKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignKind::Static { .. } => "static",
            SignKind::Dynamic { .. } => "dynamic",
            SignKind::TwoHanded { .. } => "two_handed",
            SignKind::Facial { .. } => "facial",
        }
    }

    pub fn hand(&self) -> Option<&HandPattern> {
        match self {
            SignKind::Static { hand } => Some(hand),
            SignKind::Dynamic { hand, .. }
            | SignKind::TwoHanded { hand, .. }
            | SignKind::Facial { hand, .. } => hand.as_ref(),
        }
    }

    pub fn motion(&self) -> Option<&MotionPattern> {
        match self {
            SignKind::Dynamic { motion, .. } => Some(motion),
            SignKind::TwoHanded { motion, .. } => motion.as_ref(),
            _ => None,
        }
    }

    pub fn is_motion(&self) -> bool {
        self.motion().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignDefinition {
    /// Filled from the catalog key.
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(flatten)]
    pub kind: SignKind,
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone)]
pub struct SignCatalog {
    signs: Vec<SignDefinition>,
}

impl SignCatalog {
    pub fn new(signs: Vec<SignDefinition>) -> SignCatalog {
        SignCatalog { signs }
    }

    pub fn from_json_str(json: &str) -> Result<SignCatalog, CatalogError> {
        let root: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(entries) = root else {
            return Err(CatalogError::NotAnObject);
        };
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut signs = Vec::with_capacity(entries.len());
        for (name, value) in entries {
            let mut definition: SignDefinition = serde_json::from_value(value)?;
            definition.name = name;
            signs.push(definition);
        }
        Ok(SignCatalog { signs })
    }

    pub fn from_path(path: &Path) -> Result<SignCatalog, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        SignCatalog::from_json_str(&json)
    }

    /// Write the catalog back out in the same flat shape it is read from.
    pub fn to_json_string(&self) -> Result<String, CatalogError> {
        let mut root = serde_json::Map::new();
        for sign in &self.signs {
            root.insert(sign.name.clone(), serde_json::to_value(sign)?);
        }
        Ok(serde_json::to_string_pretty(&serde_json::Value::Object(root))?)
    }

    pub fn get(&self, name: &str) -> Option<&SignDefinition> {
        self.signs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignDefinition> {
        self.signs.iter()
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a SignDefinition> {
        self.signs.iter().filter(move |s| s.category == category)
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }
}

impl Default for SignCatalog {
    fn default() -> Self {
        SignCatalog::from_json_str(DEFAULT_SIGNS).unwrap_or_else(|err| {
            tracing::error!(%err, "bundled sign table failed to parse");
            SignCatalog::new(Vec::new())
        })
    }
}
