//! Static type tags inferred by the typechecker.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Number,
    Int,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    Number,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Trades,
    Book,
    Liquidations,
}

/// Type of an expression node. Operators are total only under specific
/// shapes; the typechecker rejects everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Scalar(ScalarKind),
    Series(SeriesKind),
    Collection(CollectionKind),
    Structured(BTreeMap<String, TypeTag>),
}

impl TypeTag {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeTag::Scalar(ScalarKind::Number | ScalarKind::Int)
                | TypeTag::Series(SeriesKind::Number)
        )
    }

    pub fn is_boolish(&self) -> bool {
        matches!(
            self,
            TypeTag::Scalar(ScalarKind::Bool) | TypeTag::Series(SeriesKind::Bool)
        )
    }

    pub fn is_series(&self) -> bool {
        matches!(self, TypeTag::Series(_))
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Scalar(ScalarKind::Number) => write!(f, "Scalar<number>"),
            TypeTag::Scalar(ScalarKind::Int) => write!(f, "Scalar<int>"),
            TypeTag::Scalar(ScalarKind::Bool) => write!(f, "Scalar<bool>"),
            TypeTag::Series(SeriesKind::Number) => write!(f, "Series<number>"),
            TypeTag::Series(SeriesKind::Bool) => write!(f, "Series<bool>"),
            TypeTag::Collection(CollectionKind::Trades) => write!(f, "Collection<trades>"),
            TypeTag::Collection(CollectionKind::Book) => write!(f, "Collection<book>"),
            TypeTag::Collection(CollectionKind::Liquidations) => {
                write!(f, "Collection<liquidations>")
            }
            TypeTag::Structured(fields) => {
                write!(f, "Structured{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
