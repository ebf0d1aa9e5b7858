//! Semantic type representation: equality, assignability, literal
//! widening, name mangling, and type-parameter substitution.
//!
//! Nominal types (`Struct`, `Enum`) are name keys into the checker's
//! registries, so equality is name-based and the graph stays acyclic.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int { bits: u8, signed: bool },
    Float { bits: u8 },
    Bool,
    Void,
    Str,
    CChar,
    Null,
    /// Poison type: assignable both ways, suppresses cascading errors.
    Error,
    Ptr(Box<Type>),
    Array { elem: Box<Type>, len: Option<u64> },
    Slice(Box<Type>),
    Range(Box<Type>),
    Struct { name: String },
    Enum { name: String },
    Function(Box<FunctionSig>),
    TypeParam(String),
    Module { name: String },
    /// Generic application that still mentions type parameters; only
    /// valid inside a generic template. Monomorphization replaces it
    /// with a concrete `Struct`.
    Generic { base: String, args: Vec<Type> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub params: Vec<ParamSig>,
    pub ret: Type,
    pub throws: Vec<Type>,
    pub generic_params: Vec<String>,
    pub is_extern: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    pub is_mut: bool,
    pub is_move: bool,
}

pub const I8: Type = Type::Int { bits: 8, signed: true };
pub const I16: Type = Type::Int { bits: 16, signed: true };
pub const I32: Type = Type::Int { bits: 32, signed: true };
pub const I64: Type = Type::Int { bits: 64, signed: true };
pub const U8: Type = Type::Int { bits: 8, signed: false };
pub const U16: Type = Type::Int { bits: 16, signed: false };
pub const U32: Type = Type::Int { bits: 32, signed: false };
pub const U64: Type = Type::Int { bits: 64, signed: false };
pub const F32: Type = Type::Float { bits: 32 };
pub const F64: Type = Type::Float { bits: 64 };

impl Type {
    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Type::Ptr(_))
    }

    /// Does this type (transitively) contain a raw pointer field slot?
    /// Used for the plain-struct rule; pointer-typed fields themselves
    /// are what this looks for, so only compound wrappers recurse.
    pub fn contains_ptr(&self) -> bool {
        match self {
            Type::Ptr(_) => true,
            Type::Array { elem, .. } => elem.contains_ptr(),
            Type::Slice(elem) => elem.contains_ptr(),
            _ => false,
        }
    }

    /// Does the type mention an unsubstituted type parameter?
    pub fn is_generic_dependent(&self) -> bool {
        match self {
            Type::TypeParam(_) => true,
            Type::Generic { args, .. } => args.iter().any(Type::is_generic_dependent),
            Type::Ptr(inner) | Type::Slice(inner) | Type::Range(inner) => {
                inner.is_generic_dependent()
            }
            Type::Array { elem, .. } => elem.is_generic_dependent(),
            Type::Function(sig) => {
                sig.params.iter().any(|p| p.ty.is_generic_dependent())
                    || sig.ret.is_generic_dependent()
            }
            _ => false,
        }
    }
}

/// Structural equality; nominal for `Struct`/`Enum` (name keys).
pub fn types_equal(a: &Type, b: &Type) -> bool {
    a == b
}

/// Assignability: identity, `null` to any pointer, same-signedness
/// integer widening, and `Error` in either direction.
pub fn is_assignable_to(from: &Type, to: &Type) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (Type::Error, _) | (_, Type::Error) => true,
        (Type::Null, Type::Ptr(_)) => true,
        (
            Type::Int {
                bits: from_bits,
                signed: from_signed,
            },
            Type::Int {
                bits: to_bits,
                signed: to_signed,
            },
        ) => from_signed == to_signed && from_bits <= to_bits,
        _ => false,
    }
}

/// Whether an untyped integer literal fits the target type's range.
/// `negated` marks a literal under unary minus.
pub fn int_literal_fits(value: u128, negated: bool, target: &Type) -> bool {
    match target {
        Type::Int { bits, signed } => {
            if negated {
                if !signed {
                    return value == 0;
                }
                value <= 1u128 << (bits - 1)
            } else if *signed {
                value < 1u128 << (bits - 1)
            } else {
                value < 1u128 << bits
            }
        }
        // integer literals are assignable to floats
        Type::Float { .. } => true,
        Type::Error => true,
        _ => false,
    }
}

/// Literal assignability for a float literal.
pub fn float_literal_fits(target: &Type) -> bool {
    matches!(target, Type::Float { .. } | Type::Error)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int { bits, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, bits)
            }
            Type::Float { bits } => write!(f, "f{}", bits),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Str => write!(f, "string"),
            Type::CChar => write!(f, "cchar"),
            Type::Null => write!(f, "null"),
            Type::Error => write!(f, "<error>"),
            Type::Ptr(inner) => write!(f, "ptr<{}>", inner),
            Type::Array {
                elem,
                len: Some(len),
            } => write!(f, "array<{}, {}>", elem, len),
            Type::Array { elem, len: None } => write!(f, "array<{}>", elem),
            Type::Slice(elem) => write!(f, "slice<{}>", elem),
            Type::Range(elem) => write!(f, "range<{}>", elem),
            Type::Struct { name } | Type::Enum { name } | Type::Module { name } => {
                write!(f, "{}", name)
            }
            Type::Function(sig) => {
                write!(f, "fn(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                write!(f, ") -> {}", sig.ret)
            }
            Type::TypeParam(name) => write!(f, "{}", name),
            Type::Generic { base, args } => {
                write!(f, "{}<", base)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ">")
            }
        }
    }
}

/// Deterministic short name used to key monomorphized instances.
pub fn mangle_type_name(ty: &Type) -> String {
    match ty {
        Type::Int { bits, signed } => {
            format!("{}{}", if *signed { "i" } else { "u" }, bits)
        }
        Type::Float { bits } => format!("f{}", bits),
        Type::Bool => "bool".to_string(),
        Type::Void => "void".to_string(),
        Type::Str => "string".to_string(),
        Type::CChar => "cchar".to_string(),
        Type::Null => "null".to_string(),
        Type::Error => "error".to_string(),
        Type::Ptr(inner) => format!("ptr_{}", mangle_type_name(inner)),
        Type::Array {
            elem,
            len: Some(len),
        } => format!("array{}_{}", len, mangle_type_name(elem)),
        Type::Array { elem, len: None } => format!("array_{}", mangle_type_name(elem)),
        Type::Slice(elem) => format!("slice_{}", mangle_type_name(elem)),
        Type::Range(elem) => format!("range_{}", mangle_type_name(elem)),
        Type::Struct { name } | Type::Enum { name } | Type::Module { name } => name.clone(),
        Type::Function(_) => "fn".to_string(),
        Type::TypeParam(name) => name.clone(),
        Type::Generic { base, args } => mangle_generic_name(base, args),
    }
}

/// `mangle_generic_name("Pair", [i32, bool])` → `"Pair_i32_bool"`.
pub fn mangle_generic_name(base: &str, args: &[Type]) -> String {
    let mut name = base.to_string();
    for arg in args {
        name.push('_');
        name.push_str(&mangle_type_name(arg));
    }
    name
}

/// Replace type parameters by their bindings, walking compound types.
/// Returns `Cow::Borrowed` when nothing applied, which doubles as a
/// cheap change-detection signal.
pub fn substitute<'t>(ty: &'t Type, map: &HashMap<String, Type>) -> Cow<'t, Type> {
    match ty {
        Type::TypeParam(name) => match map.get(name) {
            Some(bound) => Cow::Owned(bound.clone()),
            None => Cow::Borrowed(ty),
        },
        Type::Ptr(inner) => match substitute(inner, map) {
            Cow::Borrowed(_) => Cow::Borrowed(ty),
            Cow::Owned(new) => Cow::Owned(Type::Ptr(Box::new(new))),
        },
        Type::Slice(inner) => match substitute(inner, map) {
            Cow::Borrowed(_) => Cow::Borrowed(ty),
            Cow::Owned(new) => Cow::Owned(Type::Slice(Box::new(new))),
        },
        Type::Range(inner) => match substitute(inner, map) {
            Cow::Borrowed(_) => Cow::Borrowed(ty),
            Cow::Owned(new) => Cow::Owned(Type::Range(Box::new(new))),
        },
        Type::Array { elem, len } => match substitute(elem, map) {
            Cow::Borrowed(_) => Cow::Borrowed(ty),
            Cow::Owned(new) => Cow::Owned(Type::Array {
                elem: Box::new(new),
                len: *len,
            }),
        },
        Type::Generic { base, args } => {
            let mut changed = false;
            let new_args: Vec<Type> = args
                .iter()
                .map(|a| match substitute(a, map) {
                    Cow::Borrowed(b) => b.clone(),
                    Cow::Owned(new) => {
                        changed = true;
                        new
                    }
                })
                .collect();
            if changed {
                Cow::Owned(Type::Generic {
                    base: base.clone(),
                    args: new_args,
                })
            } else {
                Cow::Borrowed(ty)
            }
        }
        Type::Function(sig) => {
            let mut changed = false;
            let params: Vec<ParamSig> = sig
                .params
                .iter()
                .map(|p| {
                    let new_ty = match substitute(&p.ty, map) {
                        Cow::Borrowed(b) => b.clone(),
                        Cow::Owned(new) => {
                            changed = true;
                            new
                        }
                    };
                    ParamSig {
                        ty: new_ty,
                        ..p.clone()
                    }
                })
                .collect();
            let ret = match substitute(&sig.ret, map) {
                Cow::Borrowed(b) => b.clone(),
                Cow::Owned(new) => {
                    changed = true;
                    new
                }
            };
            if changed {
                Cow::Owned(Type::Function(Box::new(FunctionSig {
                    params,
                    ret,
                    throws: sig.throws.clone(),
                    generic_params: sig.generic_params.clone(),
                    is_extern: sig.is_extern,
                })))
            } else {
                Cow::Borrowed(ty)
            }
        }
        _ => Cow::Borrowed(ty),
    }
}

/// Substitute into a whole signature.
pub fn substitute_sig(sig: &FunctionSig, map: &HashMap<String, Type>) -> FunctionSig {
    FunctionSig {
        params: sig
            .params
            .iter()
            .map(|p| ParamSig {
                ty: substitute(&p.ty, map).into_owned(),
                ..p.clone()
            })
            .collect(),
        ret: substitute(&sig.ret, map).into_owned(),
        throws: sig.throws.clone(),
        generic_params: Vec::new(),
        is_extern: sig.is_extern,
    }
}

/// Map a numeric literal suffix to its type.
pub fn suffix_type(suffix: &str) -> Option<Type> {
    Some(match suffix {
        "i8" => I8,
        "i16" => I16,
        "i32" => I32,
        "i64" | "isize" => I64,
        "u8" => U8,
        "u16" => U16,
        "u32" => U32,
        "u64" | "usize" => U64,
        "f32" => F32,
        "f64" => F64,
        _ => return None,
    })
}

/// Surface type-keyword to semantic type (aliases included).
pub fn primitive_type(name: &str) -> Option<Type> {
    Some(match name {
        "int" => I32,
        "uint" => U32,
        "i8" => I8,
        "i16" | "short" => I16,
        "i32" => I32,
        "i64" | "long" | "isize" => I64,
        "u8" | "byte" => U8,
        "u16" => U16,
        "u32" => U32,
        "u64" | "usize" => U64,
        "f32" | "float" => F32,
        "f64" | "double" => F64,
        "bool" => Type::Bool,
        "string" => Type::Str,
        "void" => Type::Void,
        "cchar" => Type::CChar,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_widening() {
        assert!(is_assignable_to(&I8, &I32));
        assert!(is_assignable_to(&U16, &U64));
        assert!(!is_assignable_to(&I32, &I8));
        assert!(!is_assignable_to(&I8, &U32)); // signedness mismatch
    }

    #[test]
    fn test_null_to_ptr() {
        assert!(is_assignable_to(&Type::Null, &Type::Ptr(Box::new(U8))));
        assert!(!is_assignable_to(&Type::Null, &I32));
    }

    #[test]
    fn test_error_is_bidirectional() {
        assert!(is_assignable_to(&Type::Error, &I32));
        assert!(is_assignable_to(&I32, &Type::Error));
    }

    #[test]
    fn test_literal_ranges() {
        assert!(int_literal_fits(127, false, &I8));
        assert!(!int_literal_fits(128, false, &I8));
        assert!(int_literal_fits(128, true, &I8)); // -128
        assert!(!int_literal_fits(129, true, &I8));
        assert!(int_literal_fits(255, false, &U8));
        assert!(!int_literal_fits(256, false, &U8));
        assert!(!int_literal_fits(1, true, &U8)); // -1 never fits unsigned
        assert!(int_literal_fits(42, false, &F64)); // int literal to float
    }

    #[test]
    fn test_mangle_generic_name() {
        assert_eq!(mangle_generic_name("Pair", &[I32, Type::Bool]), "Pair_i32_bool");
        assert_eq!(
            mangle_generic_name("Box", &[Type::Ptr(Box::new(I32))]),
            "Box_ptr_i32"
        );
    }

    #[test]
    fn test_substitute_identity() {
        let ty = Type::Ptr(Box::new(Type::Struct {
            name: "Node_i32".to_string(),
        }));
        let empty = HashMap::new();
        let result = substitute(&ty, &empty);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result.into_owned(), ty);
    }

    #[test]
    fn test_substitute_composes() {
        let ty = Type::Ptr(Box::new(Type::TypeParam("T".to_string())));

        let mut m1 = HashMap::new();
        m1.insert("T".to_string(), Type::TypeParam("U".to_string()));
        let mut m2 = HashMap::new();
        m2.insert("U".to_string(), I32);

        let step = substitute(&substitute(&ty, &m1).into_owned(), &m2).into_owned();

        // compose(m2, m1): apply m2 to m1's images
        let mut composed = HashMap::new();
        composed.insert(
            "T".to_string(),
            substitute(&Type::TypeParam("U".to_string()), &m2).into_owned(),
        );
        let direct = substitute(&ty, &composed).into_owned();

        assert_eq!(step, direct);
    }

    #[test]
    fn test_substitute_walks_generic_args() {
        let ty = Type::Generic {
            base: "Pair".to_string(),
            args: vec![Type::TypeParam("T".to_string()), Type::Bool],
        };
        let mut map = HashMap::new();
        map.insert("T".to_string(), I32);
        let result = substitute(&ty, &map).into_owned();
        assert_eq!(
            result,
            Type::Generic {
                base: "Pair".to_string(),
                args: vec![I32, Type::Bool],
            }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(I32.to_string(), "i32");
        assert_eq!(Type::Ptr(Box::new(U8)).to_string(), "ptr<u8>");
        assert_eq!(
            Type::Array {
                elem: Box::new(I32),
                len: Some(4)
            }
            .to_string(),
            "array<i32, 4>"
        );
    }
}
