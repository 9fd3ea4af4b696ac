//! Descriptor helpers and well-known types.

use std::sync::LazyLock;

use super::types::DexType;

macro_rules! known_types {
    ($($fn_name:ident => $desc:expr),* $(,)?) => {
        $(
            pub fn $fn_name() -> DexType {
                static TY: LazyLock<DexType> = LazyLock::new(|| DexType::make($desc));
                *TY
            }
        )*
    };
}

known_types! {
    void_type => "V",
    boolean_type => "Z",
    byte_type => "B",
    char_type => "C",
    short_type => "S",
    int_type => "I",
    long_type => "J",
    float_type => "F",
    double_type => "D",
    java_lang_object => "Ljava/lang/Object;",
    java_lang_string => "Ljava/lang/String;",
    java_lang_class => "Ljava/lang/Class;",
    java_lang_throwable => "Ljava/lang/Throwable;",
    java_lang_enum => "Ljava/lang/Enum;",
    java_lang_null_pointer_exception => "Ljava/lang/NullPointerException;",
}

fn first_char(ty: DexType) -> u8 {
    ty.as_str().as_bytes().first().copied().unwrap_or(b'V')
}

pub fn is_void(ty: DexType) -> bool {
    first_char(ty) == b'V'
}

pub fn is_primitive(ty: DexType) -> bool {
    matches!(
        first_char(ty),
        b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D'
    )
}

/// `J` and `D` occupy two registers.
pub fn is_wide_type(ty: DexType) -> bool {
    matches!(first_char(ty), b'J' | b'D')
}

pub fn is_object(ty: DexType) -> bool {
    matches!(first_char(ty), b'L' | b'[')
}

pub fn is_array(ty: DexType) -> bool {
    first_char(ty) == b'['
}

pub fn is_class_type(ty: DexType) -> bool {
    first_char(ty) == b'L'
}

/// Shorty character: `L` for every reference type.
pub fn shorty_char(ty: DexType) -> char {
    match first_char(ty) {
        b'[' => 'L',
        c => c as char,
    }
}

/// `[[I` -> `[I`.
pub fn get_array_component_type(ty: DexType) -> Option<DexType> {
    ty.as_str().strip_prefix('[').map(DexType::make)
}

/// `[[I` -> `I`.
pub fn get_array_element_type(ty: DexType) -> Option<DexType> {
    if !is_array(ty) {
        return None;
    }
    Some(DexType::make(ty.as_str().trim_start_matches('[')))
}

pub fn make_array_type(ty: DexType) -> DexType {
    DexType::make(&format!("[{}", ty.as_str()))
}

/// `Lcom/x/Y;` -> `Lcom/x/`; empty for the default package and non-class types.
pub fn get_package_name(ty: DexType) -> &'static str {
    let s = ty.as_str();
    if !s.starts_with('L') {
        return "";
    }
    match s.rfind('/') {
        Some(idx) => &s[..=idx],
        None => "",
    }
}

pub fn same_package(a: DexType, b: DexType) -> bool {
    get_package_name(a) == get_package_name(b)
}

/// Simple name: `Lcom/x/Y;` -> `Y`.
pub fn get_simple_name(ty: DexType) -> &'static str {
    let s = ty.as_str();
    let s = s.strip_suffix(';').unwrap_or(s);
    match s.rfind('/') {
        Some(idx) => &s[idx + 1..],
        None => s.strip_prefix('L').unwrap_or(s),
    }
}

/// Length of the first complete descriptor at the start of `s`.
pub fn descriptor_prefix_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        i += 1;
    }
    match bytes.get(i)? {
        b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' => Some(i + 1),
        b'V' if i == 0 => Some(1),
        b'L' => {
            let end = s[i..].find(';')?;
            if end < 2 {
                return None;
            }
            Some(i + end + 1)
        }
        _ => None,
    }
}

pub fn is_valid_descriptor(s: &str) -> bool {
    descriptor_prefix_len(s) == Some(s.len())
}
