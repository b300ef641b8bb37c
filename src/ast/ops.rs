use phf::phf_map;
use serde::{Deserialize, Serialize};

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(into = "String")]
#[serde(try_from = "String")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    In,
    Instanceof,
}

pub static BINARY_OPS: phf::Map<&'static str, BinaryOp> = phf_map! {
    "+" => BinaryOp::Add,
    "-" => BinaryOp::Sub,
    "*" => BinaryOp::Mul,
    "/" => BinaryOp::Div,
    "%" => BinaryOp::Mod,
    "==" => BinaryOp::Eq,
    "!=" => BinaryOp::NotEq,
    "===" => BinaryOp::StrictEq,
    "!==" => BinaryOp::StrictNotEq,
    "<" => BinaryOp::Lt,
    "<=" => BinaryOp::LtEq,
    ">" => BinaryOp::Gt,
    ">=" => BinaryOp::GtEq,
    "<<" => BinaryOp::Shl,
    ">>" => BinaryOp::Shr,
    ">>>" => BinaryOp::UShr,
    "&" => BinaryOp::BitAnd,
    "|" => BinaryOp::BitOr,
    "^" => BinaryOp::BitXor,
    "in" => BinaryOp::In,
    "instanceof" => BinaryOp::Instanceof,
};

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::In => "in",
            BinaryOp::Instanceof => "instanceof",
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(into = "String")]
#[serde(try_from = "String")]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

pub static LOGICAL_OPS: phf::Map<&'static str, LogicalOp> = phf_map! {
    "&&" => LogicalOp::And,
    "||" => LogicalOp::Or,
    "??" => LogicalOp::Nullish,
};

impl LogicalOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Nullish => "??",
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(into = "String")]
#[serde(try_from = "String")]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

pub static UNARY_OPS: phf::Map<&'static str, UnaryOp> = phf_map! {
    "-" => UnaryOp::Minus,
    "+" => UnaryOp::Plus,
    "!" => UnaryOp::Not,
    "~" => UnaryOp::BitNot,
    "typeof" => UnaryOp::Typeof,
    "void" => UnaryOp::Void,
    "delete" => UnaryOp::Delete,
};

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(into = "String")]
#[serde(try_from = "String")]
pub enum UpdateOp {
    Inc,
    Dec,
}

pub static UPDATE_OPS: phf::Map<&'static str, UpdateOp> = phf_map! {
    "++" => UpdateOp::Inc,
    "--" => UpdateOp::Dec,
};

impl UpdateOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateOp::Inc => "++",
            UpdateOp::Dec => "--",
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(into = "String")]
#[serde(try_from = "String")]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    UShrAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
}

pub static ASSIGN_OPS: phf::Map<&'static str, AssignOp> = phf_map! {
    "=" => AssignOp::Assign,
    "+=" => AssignOp::AddAssign,
    "-=" => AssignOp::SubAssign,
    "*=" => AssignOp::MulAssign,
    "/=" => AssignOp::DivAssign,
    "%=" => AssignOp::ModAssign,
    "<<=" => AssignOp::ShlAssign,
    ">>=" => AssignOp::ShrAssign,
    ">>>=" => AssignOp::UShrAssign,
    "&=" => AssignOp::BitAndAssign,
    "|=" => AssignOp::BitOrAssign,
    "^=" => AssignOp::BitXorAssign,
};

impl AssignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::ModAssign => "%=",
            AssignOp::ShlAssign => "<<=",
            AssignOp::ShrAssign => ">>=",
            AssignOp::UShrAssign => ">>>=",
            AssignOp::BitAndAssign => "&=",
            AssignOp::BitOrAssign => "|=",
            AssignOp::BitXorAssign => "^=",
        }
    }

    /// The binary operator a compound assignment combines with, `None` for
    /// plain `=`.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::ModAssign => Some(BinaryOp::Mod),
            AssignOp::ShlAssign => Some(BinaryOp::Shl),
            AssignOp::ShrAssign => Some(BinaryOp::Shr),
            AssignOp::UShrAssign => Some(BinaryOp::UShr),
            AssignOp::BitAndAssign => Some(BinaryOp::BitAnd),
            AssignOp::BitOrAssign => Some(BinaryOp::BitOr),
            AssignOp::BitXorAssign => Some(BinaryOp::BitXor),
        }
    }
}

macro_rules! op_strings {
    ($ty:ident, $table:ident) => {
        impl From<$ty> for String {
            fn from(op: $ty) -> String {
                op.as_str().to_string()
            }
        }

        impl TryFrom<String> for $ty {
            type Error = String;

            fn try_from(s: String) -> Result<$ty, String> {
                $table
                    .get(s.as_str())
                    .copied()
                    .ok_or_else(|| format!("unknown operator: {}", s))
            }
        }
    };
}

op_strings!(BinaryOp, BINARY_OPS);
op_strings!(LogicalOp, LOGICAL_OPS);
op_strings!(UnaryOp, UNARY_OPS);
op_strings!(UpdateOp, UPDATE_OPS);
op_strings!(AssignOp, ASSIGN_OPS);
