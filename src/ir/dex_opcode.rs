//! Encoded DEX opcodes and instruction formats.
//!
//! The format tag describes field layout only. The `_d`/`_s` suffix tells
//! whether the first register field is a destination or a source; `12x_2`
//! is the 2-address form where the destination is also the first source.

use std::fmt;

/// DEX instruction formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    F10x,
    F12x,
    F12x2,
    F11n,
    F11xD,
    F11xS,
    F10t,
    F20t,
    F22x,
    F21t,
    F21s,
    F21h,
    F21cD,
    F21cS,
    F23xD,
    F23xS,
    F22b,
    F22t,
    F22s,
    F22cD,
    F22cS,
    F32x,
    F30t,
    F31t,
    F31i,
    F31c,
    F35c,
    F3rc,
    F51l,
}

impl Format {
    /// Bits addressable by the destination field, if the format has one.
    pub fn dest_width(self) -> Option<u8> {
        use Format::*;
        match self {
            F12x | F12x2 | F11n | F22s | F22cD => Some(4),
            F11xD | F22x | F21s | F21h | F21cD | F23xD | F22b | F31i | F31c | F51l => Some(8),
            F32x => Some(16),
            _ => None,
        }
    }

    /// Bits addressable by source field `i`, if the format has one.
    pub fn src_width(self, i: usize) -> Option<u8> {
        use Format::*;
        match (self, i) {
            (F12x, 0) | (F12x2, 0) | (F12x2, 1) => Some(4),
            (F22t, 0) | (F22t, 1) | (F22s, 0) | (F22cD, 0) => Some(4),
            (F22cS, 0) | (F22cS, 1) => Some(4),
            (F35c, 0..=4) => Some(4),
            (F11xS, 0) | (F21t, 0) | (F21cS, 0) | (F22b, 0) | (F31t, 0) => Some(8),
            (F23xD, 0) | (F23xD, 1) => Some(8),
            (F23xS, 0..=2) => Some(8),
            (F22x, 0) | (F32x, 0) => Some(16),
            (F3rc, _) => Some(16),
            _ => None,
        }
    }

    /// 2-address forms write their result over the first source.
    pub fn dest_is_src0(self) -> bool {
        self == Format::F12x2
    }

    pub fn is_range(self) -> bool {
        self == Format::F3rc
    }

    /// Encoded size in 16-bit code units.
    pub fn size_in_units(self) -> usize {
        use Format::*;
        match self {
            F10x | F12x | F12x2 | F11n | F11xD | F11xS | F10t => 1,
            F20t | F22x | F21t | F21s | F21h | F21cD | F21cS | F23xD | F23xS | F22b | F22t
            | F22s | F22cD | F22cS => 2,
            F32x | F30t | F31t | F31i | F31c | F35c | F3rc => 3,
            F51l => 5,
        }
    }

    pub fn tag(self) -> &'static str {
        use Format::*;
        match self {
            F10x => "f10x",
            F12x => "f12x",
            F12x2 => "f12x_2",
            F11n => "f11n",
            F11xD => "f11x_d",
            F11xS => "f11x_s",
            F10t => "f10t",
            F20t => "f20t",
            F22x => "f22x",
            F21t => "f21t",
            F21s => "f21s",
            F21h => "f21h",
            F21cD => "f21c_d",
            F21cS => "f21c_s",
            F23xD => "f23x_d",
            F23xS => "f23x_s",
            F22b => "f22b",
            F22t => "f22t",
            F22s => "f22s",
            F22cD => "f22c_d",
            F22cS => "f22c_s",
            F32x => "f32x",
            F30t => "f30t",
            F31t => "f31t",
            F31i => "f31i",
            F31c => "f31c",
            F35c => "f35c",
            F3rc => "f3rc",
            F51l => "f51l",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

macro_rules! dex_opcodes {
    ($($variant:ident = $code:literal, $name:literal, $format:ident;)*) => {
        /// Encoded DEX opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum DexOpcode {
            $($variant = $code,)*
        }

        impl DexOpcode {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [DexOpcode] = &[$(DexOpcode::$variant,)*];

            pub fn from_byte(byte: u8) -> Option<DexOpcode> {
                match byte {
                    $($code => Some(DexOpcode::$variant),)*
                    _ => None,
                }
            }

            pub fn to_byte(self) -> u8 {
                self as u8
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(DexOpcode::$variant => $name,)*
                }
            }

            pub fn format(self) -> Format {
                match self {
                    $(DexOpcode::$variant => Format::$format,)*
                }
            }
        }
    };
}

dex_opcodes! {
    Nop = 0x00, "nop", F10x;
    Move = 0x01, "move", F12x;
    MoveFrom16 = 0x02, "move/from16", F22x;
    Move16 = 0x03, "move/16", F32x;
    MoveWide = 0x04, "move-wide", F12x;
    MoveWideFrom16 = 0x05, "move-wide/from16", F22x;
    MoveWide16 = 0x06, "move-wide/16", F32x;
    MoveObject = 0x07, "move-object", F12x;
    MoveObjectFrom16 = 0x08, "move-object/from16", F22x;
    MoveObject16 = 0x09, "move-object/16", F32x;
    MoveResult = 0x0a, "move-result", F11xD;
    MoveResultWide = 0x0b, "move-result-wide", F11xD;
    MoveResultObject = 0x0c, "move-result-object", F11xD;
    MoveException = 0x0d, "move-exception", F11xD;
    ReturnVoid = 0x0e, "return-void", F10x;
    Return = 0x0f, "return", F11xS;
    ReturnWide = 0x10, "return-wide", F11xS;
    ReturnObject = 0x11, "return-object", F11xS;
    Const4 = 0x12, "const/4", F11n;
    Const16 = 0x13, "const/16", F21s;
    Const = 0x14, "const", F31i;
    ConstHigh16 = 0x15, "const/high16", F21h;
    ConstWide16 = 0x16, "const-wide/16", F21s;
    ConstWide32 = 0x17, "const-wide/32", F31i;
    ConstWide = 0x18, "const-wide", F51l;
    ConstWideHigh16 = 0x19, "const-wide/high16", F21h;
    ConstString = 0x1a, "const-string", F21cD;
    ConstStringJumbo = 0x1b, "const-string/jumbo", F31c;
    ConstClass = 0x1c, "const-class", F21cD;
    MonitorEnter = 0x1d, "monitor-enter", F11xS;
    MonitorExit = 0x1e, "monitor-exit", F11xS;
    CheckCast = 0x1f, "check-cast", F21cS;
    InstanceOf = 0x20, "instance-of", F22cD;
    ArrayLength = 0x21, "array-length", F12x;
    NewInstance = 0x22, "new-instance", F21cD;
    NewArray = 0x23, "new-array", F22cD;
    FilledNewArray = 0x24, "filled-new-array", F35c;
    FilledNewArrayRange = 0x25, "filled-new-array/range", F3rc;
    FillArrayData = 0x26, "fill-array-data", F31t;
    Throw = 0x27, "throw", F11xS;
    Goto = 0x28, "goto", F10t;
    Goto16 = 0x29, "goto/16", F20t;
    Goto32 = 0x2a, "goto/32", F30t;
    PackedSwitch = 0x2b, "packed-switch", F31t;
    SparseSwitch = 0x2c, "sparse-switch", F31t;
    CmplFloat = 0x2d, "cmpl-float", F23xD;
    CmpgFloat = 0x2e, "cmpg-float", F23xD;
    CmplDouble = 0x2f, "cmpl-double", F23xD;
    CmpgDouble = 0x30, "cmpg-double", F23xD;
    CmpLong = 0x31, "cmp-long", F23xD;
    IfEq = 0x32, "if-eq", F22t;
    IfNe = 0x33, "if-ne", F22t;
    IfLt = 0x34, "if-lt", F22t;
    IfGe = 0x35, "if-ge", F22t;
    IfGt = 0x36, "if-gt", F22t;
    IfLe = 0x37, "if-le", F22t;
    IfEqz = 0x38, "if-eqz", F21t;
    IfNez = 0x39, "if-nez", F21t;
    IfLtz = 0x3a, "if-ltz", F21t;
    IfGez = 0x3b, "if-gez", F21t;
    IfGtz = 0x3c, "if-gtz", F21t;
    IfLez = 0x3d, "if-lez", F21t;
    Aget = 0x44, "aget", F23xD;
    AgetWide = 0x45, "aget-wide", F23xD;
    AgetObject = 0x46, "aget-object", F23xD;
    AgetBoolean = 0x47, "aget-boolean", F23xD;
    AgetByte = 0x48, "aget-byte", F23xD;
    AgetChar = 0x49, "aget-char", F23xD;
    AgetShort = 0x4a, "aget-short", F23xD;
    Aput = 0x4b, "aput", F23xS;
    AputWide = 0x4c, "aput-wide", F23xS;
    AputObject = 0x4d, "aput-object", F23xS;
    AputBoolean = 0x4e, "aput-boolean", F23xS;
    AputByte = 0x4f, "aput-byte", F23xS;
    AputChar = 0x50, "aput-char", F23xS;
    AputShort = 0x51, "aput-short", F23xS;
    Iget = 0x52, "iget", F22cD;
    IgetWide = 0x53, "iget-wide", F22cD;
    IgetObject = 0x54, "iget-object", F22cD;
    IgetBoolean = 0x55, "iget-boolean", F22cD;
    IgetByte = 0x56, "iget-byte", F22cD;
    IgetChar = 0x57, "iget-char", F22cD;
    IgetShort = 0x58, "iget-short", F22cD;
    Iput = 0x59, "iput", F22cS;
    IputWide = 0x5a, "iput-wide", F22cS;
    IputObject = 0x5b, "iput-object", F22cS;
    IputBoolean = 0x5c, "iput-boolean", F22cS;
    IputByte = 0x5d, "iput-byte", F22cS;
    IputChar = 0x5e, "iput-char", F22cS;
    IputShort = 0x5f, "iput-short", F22cS;
    Sget = 0x60, "sget", F21cD;
    SgetWide = 0x61, "sget-wide", F21cD;
    SgetObject = 0x62, "sget-object", F21cD;
    SgetBoolean = 0x63, "sget-boolean", F21cD;
    SgetByte = 0x64, "sget-byte", F21cD;
    SgetChar = 0x65, "sget-char", F21cD;
    SgetShort = 0x66, "sget-short", F21cD;
    Sput = 0x67, "sput", F21cS;
    SputWide = 0x68, "sput-wide", F21cS;
    SputObject = 0x69, "sput-object", F21cS;
    SputBoolean = 0x6a, "sput-boolean", F21cS;
    SputByte = 0x6b, "sput-byte", F21cS;
    SputChar = 0x6c, "sput-char", F21cS;
    SputShort = 0x6d, "sput-short", F21cS;
    InvokeVirtual = 0x6e, "invoke-virtual", F35c;
    InvokeSuper = 0x6f, "invoke-super", F35c;
    InvokeDirect = 0x70, "invoke-direct", F35c;
    InvokeStatic = 0x71, "invoke-static", F35c;
    InvokeInterface = 0x72, "invoke-interface", F35c;
    InvokeVirtualRange = 0x74, "invoke-virtual/range", F3rc;
    InvokeSuperRange = 0x75, "invoke-super/range", F3rc;
    InvokeDirectRange = 0x76, "invoke-direct/range", F3rc;
    InvokeStaticRange = 0x77, "invoke-static/range", F3rc;
    InvokeInterfaceRange = 0x78, "invoke-interface/range", F3rc;
    NegInt = 0x7b, "neg-int", F12x;
    NotInt = 0x7c, "not-int", F12x;
    NegLong = 0x7d, "neg-long", F12x;
    NotLong = 0x7e, "not-long", F12x;
    NegFloat = 0x7f, "neg-float", F12x;
    NegDouble = 0x80, "neg-double", F12x;
    IntToLong = 0x81, "int-to-long", F12x;
    IntToFloat = 0x82, "int-to-float", F12x;
    IntToDouble = 0x83, "int-to-double", F12x;
    LongToInt = 0x84, "long-to-int", F12x;
    LongToFloat = 0x85, "long-to-float", F12x;
    LongToDouble = 0x86, "long-to-double", F12x;
    FloatToInt = 0x87, "float-to-int", F12x;
    FloatToLong = 0x88, "float-to-long", F12x;
    FloatToDouble = 0x89, "float-to-double", F12x;
    DoubleToInt = 0x8a, "double-to-int", F12x;
    DoubleToLong = 0x8b, "double-to-long", F12x;
    DoubleToFloat = 0x8c, "double-to-float", F12x;
    IntToByte = 0x8d, "int-to-byte", F12x;
    IntToChar = 0x8e, "int-to-char", F12x;
    IntToShort = 0x8f, "int-to-short", F12x;
    AddInt = 0x90, "add-int", F23xD;
    SubInt = 0x91, "sub-int", F23xD;
    MulInt = 0x92, "mul-int", F23xD;
    DivInt = 0x93, "div-int", F23xD;
    RemInt = 0x94, "rem-int", F23xD;
    AndInt = 0x95, "and-int", F23xD;
    OrInt = 0x96, "or-int", F23xD;
    XorInt = 0x97, "xor-int", F23xD;
    ShlInt = 0x98, "shl-int", F23xD;
    ShrInt = 0x99, "shr-int", F23xD;
    UshrInt = 0x9a, "ushr-int", F23xD;
    AddLong = 0x9b, "add-long", F23xD;
    SubLong = 0x9c, "sub-long", F23xD;
    MulLong = 0x9d, "mul-long", F23xD;
    DivLong = 0x9e, "div-long", F23xD;
    RemLong = 0x9f, "rem-long", F23xD;
    AndLong = 0xa0, "and-long", F23xD;
    OrLong = 0xa1, "or-long", F23xD;
    XorLong = 0xa2, "xor-long", F23xD;
    ShlLong = 0xa3, "shl-long", F23xD;
    ShrLong = 0xa4, "shr-long", F23xD;
    UshrLong = 0xa5, "ushr-long", F23xD;
    AddFloat = 0xa6, "add-float", F23xD;
    SubFloat = 0xa7, "sub-float", F23xD;
    MulFloat = 0xa8, "mul-float", F23xD;
    DivFloat = 0xa9, "div-float", F23xD;
    RemFloat = 0xaa, "rem-float", F23xD;
    AddDouble = 0xab, "add-double", F23xD;
    SubDouble = 0xac, "sub-double", F23xD;
    MulDouble = 0xad, "mul-double", F23xD;
    DivDouble = 0xae, "div-double", F23xD;
    RemDouble = 0xaf, "rem-double", F23xD;
    AddInt2Addr = 0xb0, "add-int/2addr", F12x2;
    SubInt2Addr = 0xb1, "sub-int/2addr", F12x2;
    MulInt2Addr = 0xb2, "mul-int/2addr", F12x2;
    DivInt2Addr = 0xb3, "div-int/2addr", F12x2;
    RemInt2Addr = 0xb4, "rem-int/2addr", F12x2;
    AndInt2Addr = 0xb5, "and-int/2addr", F12x2;
    OrInt2Addr = 0xb6, "or-int/2addr", F12x2;
    XorInt2Addr = 0xb7, "xor-int/2addr", F12x2;
    ShlInt2Addr = 0xb8, "shl-int/2addr", F12x2;
    ShrInt2Addr = 0xb9, "shr-int/2addr", F12x2;
    UshrInt2Addr = 0xba, "ushr-int/2addr", F12x2;
    AddLong2Addr = 0xbb, "add-long/2addr", F12x2;
    SubLong2Addr = 0xbc, "sub-long/2addr", F12x2;
    MulLong2Addr = 0xbd, "mul-long/2addr", F12x2;
    DivLong2Addr = 0xbe, "div-long/2addr", F12x2;
    RemLong2Addr = 0xbf, "rem-long/2addr", F12x2;
    AndLong2Addr = 0xc0, "and-long/2addr", F12x2;
    OrLong2Addr = 0xc1, "or-long/2addr", F12x2;
    XorLong2Addr = 0xc2, "xor-long/2addr", F12x2;
    ShlLong2Addr = 0xc3, "shl-long/2addr", F12x2;
    ShrLong2Addr = 0xc4, "shr-long/2addr", F12x2;
    UshrLong2Addr = 0xc5, "ushr-long/2addr", F12x2;
    AddFloat2Addr = 0xc6, "add-float/2addr", F12x2;
    SubFloat2Addr = 0xc7, "sub-float/2addr", F12x2;
    MulFloat2Addr = 0xc8, "mul-float/2addr", F12x2;
    DivFloat2Addr = 0xc9, "div-float/2addr", F12x2;
    RemFloat2Addr = 0xca, "rem-float/2addr", F12x2;
    AddDouble2Addr = 0xcb, "add-double/2addr", F12x2;
    SubDouble2Addr = 0xcc, "sub-double/2addr", F12x2;
    MulDouble2Addr = 0xcd, "mul-double/2addr", F12x2;
    DivDouble2Addr = 0xce, "div-double/2addr", F12x2;
    RemDouble2Addr = 0xcf, "rem-double/2addr", F12x2;
    AddIntLit16 = 0xd0, "add-int/lit16", F22s;
    RsubInt = 0xd1, "rsub-int", F22s;
    MulIntLit16 = 0xd2, "mul-int/lit16", F22s;
    DivIntLit16 = 0xd3, "div-int/lit16", F22s;
    RemIntLit16 = 0xd4, "rem-int/lit16", F22s;
    AndIntLit16 = 0xd5, "and-int/lit16", F22s;
    OrIntLit16 = 0xd6, "or-int/lit16", F22s;
    XorIntLit16 = 0xd7, "xor-int/lit16", F22s;
    AddIntLit8 = 0xd8, "add-int/lit8", F22b;
    RsubIntLit8 = 0xd9, "rsub-int/lit8", F22b;
    MulIntLit8 = 0xda, "mul-int/lit8", F22b;
    DivIntLit8 = 0xdb, "div-int/lit8", F22b;
    RemIntLit8 = 0xdc, "rem-int/lit8", F22b;
    AndIntLit8 = 0xdd, "and-int/lit8", F22b;
    OrIntLit8 = 0xde, "or-int/lit8", F22b;
    XorIntLit8 = 0xdf, "xor-int/lit8", F22b;
    ShlIntLit8 = 0xe0, "shl-int/lit8", F22b;
    ShrIntLit8 = 0xe1, "shr-int/lit8", F22b;
    UshrIntLit8 = 0xe2, "ushr-int/lit8", F22b;
}

impl DexOpcode {
    pub fn dest_width(self) -> Option<u8> {
        self.format().dest_width()
    }

    pub fn src_width(self, i: usize) -> Option<u8> {
        self.format().src_width(i)
    }

    pub fn dest_is_src0(self) -> bool {
        self.format().dest_is_src0()
    }

    pub fn is_range(self) -> bool {
        self.format().is_range()
    }

    /// The 2-address sibling of a 3-register binop.
    pub fn two_addr_form(self) -> Option<DexOpcode> {
        let code = self.to_byte();
        if (0x90..=0xaf).contains(&code) {
            DexOpcode::from_byte(code + 0x20)
        } else {
            None
        }
    }

    /// The /range sibling of an invoke or filled-new-array.
    pub fn range_form(self) -> Option<DexOpcode> {
        use DexOpcode::*;
        match self {
            InvokeVirtual => Some(InvokeVirtualRange),
            InvokeSuper => Some(InvokeSuperRange),
            InvokeDirect => Some(InvokeDirectRange),
            InvokeStatic => Some(InvokeStaticRange),
            InvokeInterface => Some(InvokeInterfaceRange),
            FilledNewArray => Some(FilledNewArrayRange),
            _ => None,
        }
    }
}

impl fmt::Display for DexOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
