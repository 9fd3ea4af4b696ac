//! Named properties of the program and how passes interact with them.
//!
//! After each pass a property holds if the pass establishes it, or if it
//! held before and the pass requires or preserves it. A pass that does not
//! mention a property destroys it, except for the `No*Instructions`
//! properties: those only break when a pass says so, since a pass that
//! never emits the instruction cannot introduce it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::{PassError, PassResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyName {
    /// Every dex file respects the method/field/type reference limits.
    DexLimitsObeyed,
    HasSourceBlocks,
    /// No field or method reference resolves to a definition it could name
    /// directly.
    NoResolvablePureRefs,
    NoInitClassInstructions,
    NoWriteBarrierInstructions,
    /// Every instruction is reachable from its method's entry.
    NoUnreachableInstructions,
    /// Every body uses physical registers that fit their encodings.
    RegistersAllocated,
}

impl PropertyName {
    pub const ALL: [PropertyName; 7] = [
        PropertyName::DexLimitsObeyed,
        PropertyName::HasSourceBlocks,
        PropertyName::NoResolvablePureRefs,
        PropertyName::NoInitClassInstructions,
        PropertyName::NoWriteBarrierInstructions,
        PropertyName::NoUnreachableInstructions,
        PropertyName::RegistersAllocated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyName::DexLimitsObeyed => "DexLimitsObeyed",
            PropertyName::HasSourceBlocks => "HasSourceBlocks",
            PropertyName::NoResolvablePureRefs => "NoResolvablePureRefs",
            PropertyName::NoInitClassInstructions => "NoInitClassInstructions",
            PropertyName::NoWriteBarrierInstructions => "NoWriteBarrierInstructions",
            PropertyName::NoUnreachableInstructions => "NoUnreachableInstructions",
            PropertyName::RegistersAllocated => "RegistersAllocated",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }

    /// Properties that state the absence of an instruction kind.
    pub fn is_negative(self) -> bool {
        matches!(
            self,
            PropertyName::NoInitClassInstructions
                | PropertyName::NoWriteBarrierInstructions
                | PropertyName::NoUnreachableInstructions
        )
    }

    /// What holds on freshly loaded input.
    pub fn initial() -> BTreeSet<PropertyName> {
        [
            PropertyName::DexLimitsObeyed,
            PropertyName::NoInitClassInstructions,
            PropertyName::NoWriteBarrierInstructions,
            PropertyName::NoUnreachableInstructions,
        ]
        .into_iter()
        .collect()
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    /// Must hold before the pass; still holds after it.
    Requires,
    Preserves,
    Establishes,
    Destroys,
}

pub type PropertyInteractions = BTreeMap<PropertyName, Interaction>;

/// Build an interaction map from `(property, interaction)` pairs.
pub fn interactions<I>(pairs: I) -> PropertyInteractions
where
    I: IntoIterator<Item = (PropertyName, Interaction)>,
{
    pairs.into_iter().collect()
}

/// The established properties after a pass that starts from `before`.
pub fn apply_interactions(
    before: &BTreeSet<PropertyName>,
    interactions: &PropertyInteractions,
) -> BTreeSet<PropertyName> {
    let mut after: BTreeSet<PropertyName> = before
        .iter()
        .copied()
        .filter(|p| match interactions.get(p) {
            Some(Interaction::Requires | Interaction::Preserves) => true,
            Some(Interaction::Establishes) => true,
            Some(Interaction::Destroys) => false,
            None => p.is_negative(),
        })
        .collect();
    after.extend(
        interactions
            .iter()
            .filter(|(_, i)| **i == Interaction::Establishes)
            .map(|(p, _)| *p),
    );
    after
}

/// Check the requirements of a pipeline without running it. Returns the
/// established set after each pass.
pub fn verify_pipeline(
    pipeline: &[(String, PropertyInteractions)],
) -> PassResult<Vec<BTreeSet<PropertyName>>> {
    let mut established = PropertyName::initial();
    let mut states = Vec::with_capacity(pipeline.len());
    for (pass, interactions) in pipeline {
        for (property, interaction) in interactions {
            if *interaction == Interaction::Requires && !established.contains(property) {
                return Err(PassError::UnsatisfiedRequirement {
                    pass: pass.clone(),
                    property: *property,
                });
            }
        }
        established = apply_interactions(&established, interactions);
        states.push(established.clone());
    }
    Ok(states)
}
