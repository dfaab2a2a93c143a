//! Types for representing branches and branch outcomes.

/// A branch outcome.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    /// Not taken
    N = 0,
    /// Taken
    T = 1,
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Self::T => "t",
            Self::N => "n",
        };
        write!(f, "{}", s)
    }
}

impl std::ops::Not for Outcome {
    type Output = Self;
    fn not(self) -> Self {
        match self {
            Self::N => Self::T,
            Self::T => Self::N,
        }
    }
}

impl From<bool> for Outcome {
    fn from(x: bool) -> Self {
        match x {
            true => Self::T,
            false => Self::N,
        }
    }
}

impl From<Outcome> for bool {
    fn from(x: Outcome) -> bool {
        match x {
            Outcome::T => true,
            Outcome::N => false,
        }
    }
}

/// The kind of control-flow instruction at a branch site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BranchKind {
    Jmp,
    Call,
    Ret,
    #[default]
    Unknown,
}

/// Whether the instruction encodes its target directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Directness {
    Direct,
    Indirect,
    #[default]
    Unknown,
}

/// Whether the instruction can fall through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Conditionality {
    Conditional,
    Unconditional,
    #[default]
    Unknown,
}

/// The static classification of a branch site, parsed from a `class:`
/// annotation like `JMP+DIR+CND`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BranchClass {
    pub kind: BranchKind,
    pub directness: Directness,
    pub conditionality: Conditionality,
}

impl BranchClass {
    /// Parse a `+`-separated class annotation. Unknown components are
    /// rejected; a missing component leaves the field Unknown.
    pub fn parse(token: &str) -> Result<Self, ()> {
        let mut class = Self::default();
        for part in token.split('+') {
            match part {
                "JMP" => class.kind = BranchKind::Jmp,
                "CALL" => class.kind = BranchKind::Call,
                "RET" => class.kind = BranchKind::Ret,
                "DIR" => class.directness = Directness::Direct,
                "IND" => class.directness = Directness::Indirect,
                "CND" => class.conditionality = Conditionality::Conditional,
                "UCD" => class.conditionality = Conditionality::Unconditional,
                _ => return Err(()),
            }
        }
        Ok(class)
    }
}

impl std::fmt::Display for BranchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut parts: Vec<&str> = Vec::new();
        match self.kind {
            BranchKind::Jmp => parts.push("JMP"),
            BranchKind::Call => parts.push("CALL"),
            BranchKind::Ret => parts.push("RET"),
            BranchKind::Unknown => {}
        }
        match self.directness {
            Directness::Direct => parts.push("DIR"),
            Directness::Indirect => parts.push("IND"),
            Directness::Unknown => {}
        }
        match self.conditionality {
            Conditionality::Conditional => parts.push("CND"),
            Conditionality::Unconditional => parts.push("UCD"),
            Conditionality::Unknown => {}
        }
        write!(f, "{}", parts.join("+"))
    }
}

/// Observed target dynamism from a `behavior:` annotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dynamism {
    AlwaysTaken,
    AlwaysNotTaken,
    Dynamic,
    #[default]
    Unknown,
}

/// The observed behavior of a branch site, parsed from a `behavior:`
/// annotation like `DIR+AT`. Preserved in the data model; no predictor
/// consults it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BranchBehavior {
    pub indirectness: Directness,
    pub dynamism: Dynamism,
}

impl BranchBehavior {
    pub fn parse(token: &str) -> Result<Self, ()> {
        let mut behavior = Self::default();
        for part in token.split('+') {
            match part {
                "DIR" => behavior.indirectness = Directness::Direct,
                "IND" => behavior.indirectness = Directness::Indirect,
                "AT" => behavior.dynamism = Dynamism::AlwaysTaken,
                "ANT" => behavior.dynamism = Dynamism::AlwaysNotTaken,
                "DYN" => behavior.dynamism = Dynamism::Dynamic,
                _ => return Err(()),
            }
        }
        Ok(behavior)
    }
}

impl std::fmt::Display for BranchBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut parts: Vec<&str> = Vec::new();
        match self.indirectness {
            Directness::Direct => parts.push("DIR"),
            Directness::Indirect => parts.push("IND"),
            Directness::Unknown => {}
        }
        match self.dynamism {
            Dynamism::AlwaysTaken => parts.push("AT"),
            Dynamism::AlwaysNotTaken => parts.push("ANT"),
            Dynamism::Dynamic => parts.push("DYN"),
            Dynamism::Unknown => {}
        }
        write!(f, "{}", parts.join("+"))
    }
}

/// The full branch-opcode taxonomy the driver dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpType {
    RetCond,
    RetUncond,
    JmpDirectCond,
    JmpDirectUncond,
    JmpIndirectCond,
    JmpIndirectUncond,
    CallDirectCond,
    CallDirectUncond,
    CallIndirectCond,
    CallIndirectUncond,
    Error,
}

/// Derive an [OpType] from a branch classification.
///
/// Returns come out in the RET arm regardless of directness. Anything with
/// an unknown component classifies as [OpType::Error]; the driver decides
/// whether that is fatal (it is, except on the sentinel node).
pub fn classify(class: &BranchClass) -> OpType {
    match class.kind {
        BranchKind::Ret => match class.conditionality {
            Conditionality::Conditional => OpType::RetCond,
            Conditionality::Unconditional => OpType::RetUncond,
            Conditionality::Unknown => OpType::Error,
        },
        BranchKind::Jmp => match (class.directness, class.conditionality) {
            (Directness::Direct, Conditionality::Conditional) => OpType::JmpDirectCond,
            (Directness::Direct, Conditionality::Unconditional) => OpType::JmpDirectUncond,
            (Directness::Indirect, Conditionality::Conditional) => OpType::JmpIndirectCond,
            (Directness::Indirect, Conditionality::Unconditional) => OpType::JmpIndirectUncond,
            _ => OpType::Error,
        },
        BranchKind::Call => match (class.directness, class.conditionality) {
            (Directness::Direct, Conditionality::Conditional) => OpType::CallDirectCond,
            (Directness::Direct, Conditionality::Unconditional) => OpType::CallDirectUncond,
            (Directness::Indirect, Conditionality::Conditional) => OpType::CallIndirectCond,
            (Directness::Indirect, Conditionality::Unconditional) => OpType::CallIndirectUncond,
            _ => OpType::Error,
        },
        BranchKind::Unknown => OpType::Error,
    }
}
