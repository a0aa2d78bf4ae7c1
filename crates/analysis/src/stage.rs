//! Programmable pipeline stages and stage visibility sets

use serde::Serialize;
use std::fmt;

/// A programmable pipeline stage an entry point can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Compute,
    Vertex,
    Fragment,
}

impl Stage {
    /// Converts a naga shader stage into a [`Stage`]
    pub fn from_naga(stage: naga::ShaderStage) -> Self {
        match stage {
            naga::ShaderStage::Compute => Stage::Compute,
            naga::ShaderStage::Vertex => Stage::Vertex,
            naga::ShaderStage::Fragment => Stage::Fragment,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Stage::Compute => 1 << 0,
            Stage::Vertex => 1 << 1,
            Stage::Fragment => 1 << 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compute => write!(f, "compute"),
            Stage::Vertex => write!(f, "vertex"),
            Stage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Bit set of pipeline stages a binding is visible to
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageSet(u8);

impl StageSet {
    /// No stage
    pub const NONE: StageSet = StageSet(0);
    /// Compute stage only
    pub const COMPUTE: StageSet = StageSet(Stage::Compute.bit());
    /// Vertex stage only
    pub const VERTEX: StageSet = StageSet(Stage::Vertex.bit());
    /// Fragment stage only
    pub const FRAGMENT: StageSet = StageSet(Stage::Fragment.bit());

    /// Returns the union of both sets
    pub const fn union(self, other: StageSet) -> StageSet {
        StageSet(self.0 | other.0)
    }

    /// Returns this set with `stage` added
    pub const fn with(self, stage: Stage) -> StageSet {
        StageSet(self.0 | stage.bit())
    }

    pub const fn contains(self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    /// Returns true if every stage of `other` is also in this set
    pub const fn is_superset_of(self, other: StageSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the stages in this set in compute, vertex, fragment order
    pub fn iter(self) -> impl Iterator<Item = Stage> {
        [Stage::Compute, Stage::Vertex, Stage::Fragment].into_iter().filter(move |stage| self.contains(*stage))
    }
}

impl From<Stage> for StageSet {
    fn from(stage: Stage) -> Self {
        StageSet(stage.bit())
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        iter.into_iter().fold(StageSet::NONE, StageSet::with)
    }
}

impl std::ops::BitOr for StageSet {
    type Output = StageSet;

    fn bitor(self, rhs: StageSet) -> StageSet {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for StageSet {
    fn bitor_assign(&mut self, rhs: StageSet) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for StageSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
