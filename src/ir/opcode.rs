//! IR opcodes.
//!
//! The IR vocabulary folds encoding variants together: there is one `const`,
//! one `goto`, one `switch`, one form per literal binop and no `/range`
//! invokes. Operations that write a result through a separate
//! `move-result-pseudo*` carry no destination of their own.
//!
//! Internal opcodes (`load-param*`, `move-result-pseudo*`, `init-class`,
//! `write-barrier`) never reach the output; they are lowered or removed
//! before encoding.

use std::fmt;

use super::dex_opcode::DexOpcode;

macro_rules! ir_opcodes {
    ($($variant:ident => $name:literal,)*) => {
        /// IR opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum IROpcode {
            $($variant,)*
        }

        impl IROpcode {
            pub const ALL: &'static [IROpcode] = &[$(IROpcode::$variant,)*];

            /// Assembly spelling, e.g. `add-int/lit`.
            pub fn name(self) -> &'static str {
                match self {
                    $(IROpcode::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<IROpcode> {
                match name {
                    $($name => Some(IROpcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

ir_opcodes! {
    Nop => "nop",
    Move => "move",
    MoveWide => "move-wide",
    MoveObject => "move-object",
    MoveResult => "move-result",
    MoveResultWide => "move-result-wide",
    MoveResultObject => "move-result-object",
    MoveException => "move-exception",
    ReturnVoid => "return-void",
    Return => "return",
    ReturnWide => "return-wide",
    ReturnObject => "return-object",
    Const => "const",
    ConstWide => "const-wide",
    ConstString => "const-string",
    ConstClass => "const-class",
    MonitorEnter => "monitor-enter",
    MonitorExit => "monitor-exit",
    CheckCast => "check-cast",
    InstanceOf => "instance-of",
    ArrayLength => "array-length",
    NewInstance => "new-instance",
    NewArray => "new-array",
    FilledNewArray => "filled-new-array",
    FillArrayData => "fill-array-data",
    Throw => "throw",
    Goto => "goto",
    Switch => "switch",
    CmplFloat => "cmpl-float",
    CmpgFloat => "cmpg-float",
    CmplDouble => "cmpl-double",
    CmpgDouble => "cmpg-double",
    CmpLong => "cmp-long",
    IfEq => "if-eq",
    IfNe => "if-ne",
    IfLt => "if-lt",
    IfGe => "if-ge",
    IfGt => "if-gt",
    IfLe => "if-le",
    IfEqz => "if-eqz",
    IfNez => "if-nez",
    IfLtz => "if-ltz",
    IfGez => "if-gez",
    IfGtz => "if-gtz",
    IfLez => "if-lez",
    Aget => "aget",
    AgetWide => "aget-wide",
    AgetObject => "aget-object",
    AgetBoolean => "aget-boolean",
    AgetByte => "aget-byte",
    AgetChar => "aget-char",
    AgetShort => "aget-short",
    Aput => "aput",
    AputWide => "aput-wide",
    AputObject => "aput-object",
    AputBoolean => "aput-boolean",
    AputByte => "aput-byte",
    AputChar => "aput-char",
    AputShort => "aput-short",
    Iget => "iget",
    IgetWide => "iget-wide",
    IgetObject => "iget-object",
    IgetBoolean => "iget-boolean",
    IgetByte => "iget-byte",
    IgetChar => "iget-char",
    IgetShort => "iget-short",
    Iput => "iput",
    IputWide => "iput-wide",
    IputObject => "iput-object",
    IputBoolean => "iput-boolean",
    IputByte => "iput-byte",
    IputChar => "iput-char",
    IputShort => "iput-short",
    Sget => "sget",
    SgetWide => "sget-wide",
    SgetObject => "sget-object",
    SgetBoolean => "sget-boolean",
    SgetByte => "sget-byte",
    SgetChar => "sget-char",
    SgetShort => "sget-short",
    Sput => "sput",
    SputWide => "sput-wide",
    SputObject => "sput-object",
    SputBoolean => "sput-boolean",
    SputByte => "sput-byte",
    SputChar => "sput-char",
    SputShort => "sput-short",
    InvokeVirtual => "invoke-virtual",
    InvokeSuper => "invoke-super",
    InvokeDirect => "invoke-direct",
    InvokeStatic => "invoke-static",
    InvokeInterface => "invoke-interface",
    NegInt => "neg-int",
    NotInt => "not-int",
    NegLong => "neg-long",
    NotLong => "not-long",
    NegFloat => "neg-float",
    NegDouble => "neg-double",
    IntToLong => "int-to-long",
    IntToFloat => "int-to-float",
    IntToDouble => "int-to-double",
    LongToInt => "long-to-int",
    LongToFloat => "long-to-float",
    LongToDouble => "long-to-double",
    FloatToInt => "float-to-int",
    FloatToLong => "float-to-long",
    FloatToDouble => "float-to-double",
    DoubleToInt => "double-to-int",
    DoubleToLong => "double-to-long",
    DoubleToFloat => "double-to-float",
    IntToByte => "int-to-byte",
    IntToChar => "int-to-char",
    IntToShort => "int-to-short",
    AddInt => "add-int",
    SubInt => "sub-int",
    MulInt => "mul-int",
    DivInt => "div-int",
    RemInt => "rem-int",
    AndInt => "and-int",
    OrInt => "or-int",
    XorInt => "xor-int",
    ShlInt => "shl-int",
    ShrInt => "shr-int",
    UshrInt => "ushr-int",
    AddLong => "add-long",
    SubLong => "sub-long",
    MulLong => "mul-long",
    DivLong => "div-long",
    RemLong => "rem-long",
    AndLong => "and-long",
    OrLong => "or-long",
    XorLong => "xor-long",
    ShlLong => "shl-long",
    ShrLong => "shr-long",
    UshrLong => "ushr-long",
    AddFloat => "add-float",
    SubFloat => "sub-float",
    MulFloat => "mul-float",
    DivFloat => "div-float",
    RemFloat => "rem-float",
    AddDouble => "add-double",
    SubDouble => "sub-double",
    MulDouble => "mul-double",
    DivDouble => "div-double",
    RemDouble => "rem-double",
    AddIntLit => "add-int/lit",
    RsubIntLit => "rsub-int/lit",
    MulIntLit => "mul-int/lit",
    DivIntLit => "div-int/lit",
    RemIntLit => "rem-int/lit",
    AndIntLit => "and-int/lit",
    OrIntLit => "or-int/lit",
    XorIntLit => "xor-int/lit",
    ShlIntLit => "shl-int/lit",
    ShrIntLit => "shr-int/lit",
    UshrIntLit => "ushr-int/lit",
    LoadParam => "load-param",
    LoadParamObject => "load-param-object",
    LoadParamWide => "load-param-wide",
    MoveResultPseudo => "move-result-pseudo",
    MoveResultPseudoObject => "move-result-pseudo-object",
    MoveResultPseudoWide => "move-result-pseudo-wide",
    InitClass => "init-class",
    WriteBarrier => "write-barrier",
}

/// Category of the instruction's reference operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    None,
    Literal,
    String,
    Type,
    Field,
    Method,
    Data,
}

impl IROpcode {
    pub fn is_move(self) -> bool {
        matches!(self, IROpcode::Move | IROpcode::MoveWide | IROpcode::MoveObject)
    }

    pub fn is_move_result(self) -> bool {
        matches!(
            self,
            IROpcode::MoveResult | IROpcode::MoveResultWide | IROpcode::MoveResultObject
        )
    }

    pub fn is_move_result_pseudo(self) -> bool {
        matches!(
            self,
            IROpcode::MoveResultPseudo
                | IROpcode::MoveResultPseudoObject
                | IROpcode::MoveResultPseudoWide
        )
    }

    pub fn is_move_result_any(self) -> bool {
        self.is_move_result() || self.is_move_result_pseudo()
    }

    pub fn is_load_param(self) -> bool {
        matches!(
            self,
            IROpcode::LoadParam | IROpcode::LoadParamObject | IROpcode::LoadParamWide
        )
    }

    pub fn is_return(self) -> bool {
        matches!(
            self,
            IROpcode::ReturnVoid | IROpcode::Return | IROpcode::ReturnWide | IROpcode::ReturnObject
        )
    }

    pub fn is_throw(self) -> bool {
        self == IROpcode::Throw
    }

    pub fn is_goto(self) -> bool {
        self == IROpcode::Goto
    }

    pub fn is_switch(self) -> bool {
        self == IROpcode::Switch
    }

    pub fn is_conditional_branch(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe | IfEqz | IfNez | IfLtz | IfGez | IfGtz | IfLez
        )
    }

    /// Two-register `if-*` forms.
    pub fn is_conditional_branch_2(self) -> bool {
        use IROpcode::*;
        matches!(self, IfEq | IfNe | IfLt | IfGe | IfGt | IfLe)
    }

    pub fn is_branch(self) -> bool {
        self.is_goto() || self.is_switch() || self.is_conditional_branch()
    }

    /// Control never falls through to the next instruction.
    pub fn ends_flow(self) -> bool {
        self.is_return() || self.is_throw() || self.is_goto()
    }

    pub fn is_invoke(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface
        )
    }

    pub fn is_aget(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            Aget | AgetWide | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort
        )
    }

    pub fn is_aput(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            Aput | AputWide | AputObject | AputBoolean | AputByte | AputChar | AputShort
        )
    }

    pub fn is_iget(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            Iget | IgetWide | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort
        )
    }

    pub fn is_iput(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            Iput | IputWide | IputObject | IputBoolean | IputByte | IputChar | IputShort
        )
    }

    pub fn is_sget(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            Sget | SgetWide | SgetObject | SgetBoolean | SgetByte | SgetChar | SgetShort
        )
    }

    pub fn is_sput(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            Sput | SputWide | SputObject | SputBoolean | SputByte | SputChar | SputShort
        )
    }

    pub fn is_ifield_op(self) -> bool {
        self.is_iget() || self.is_iput()
    }

    pub fn is_sfield_op(self) -> bool {
        self.is_sget() || self.is_sput()
    }

    pub fn is_field_op(self) -> bool {
        self.is_ifield_op() || self.is_sfield_op()
    }

    pub fn is_cmp(self) -> bool {
        use IROpcode::*;
        matches!(self, CmplFloat | CmpgFloat | CmplDouble | CmpgDouble | CmpLong)
    }

    pub fn is_unop(self) -> bool {
        (IROpcode::NegInt..=IROpcode::IntToShort).contains(&self)
    }

    /// Three-register arithmetic.
    pub fn is_binop(self) -> bool {
        (IROpcode::AddInt..=IROpcode::RemDouble).contains(&self)
    }

    pub fn is_binop_lit(self) -> bool {
        (IROpcode::AddIntLit..=IROpcode::UshrIntLit).contains(&self)
    }

    pub fn is_div_int_lit(self) -> bool {
        matches!(self, IROpcode::DivIntLit | IROpcode::RemIntLit)
    }

    pub fn is_shift_lit(self) -> bool {
        matches!(
            self,
            IROpcode::ShlIntLit | IROpcode::ShrIntLit | IROpcode::UshrIntLit
        )
    }

    pub fn is_const(self) -> bool {
        matches!(self, IROpcode::Const | IROpcode::ConstWide)
    }

    pub fn is_monitor(self) -> bool {
        matches!(self, IROpcode::MonitorEnter | IROpcode::MonitorExit)
    }

    pub fn is_internal(self) -> bool {
        self.is_load_param()
            || self.is_move_result_pseudo()
            || matches!(self, IROpcode::InitClass | IROpcode::WriteBarrier)
    }

    /// The result of this operation is delivered by a following
    /// `move-result-pseudo*`.
    pub fn has_move_result_pseudo(self) -> bool {
        use IROpcode::*;
        self.is_aget()
            || self.is_iget()
            || self.is_sget()
            || self.is_div_int_lit()
            || matches!(
                self,
                ConstString | ConstClass | CheckCast | InstanceOf | ArrayLength | NewInstance
                    | NewArray
            )
    }

    /// The result of this operation may be picked up by a following
    /// `move-result*`.
    pub fn has_move_result(self) -> bool {
        self.is_invoke() || self == IROpcode::FilledNewArray
    }

    /// Whether the operation writes a register directly.
    pub fn has_dest(self) -> bool {
        use IROpcode::*;
        self.is_move()
            || self.is_move_result_any()
            || self.is_load_param()
            || self.is_cmp()
            || self.is_unop()
            || self.is_binop()
            || (self.is_binop_lit() && !self.is_div_int_lit())
            || matches!(self, MoveException | Const | ConstWide)
    }

    /// Whether executing the operation may raise an exception.
    pub fn may_throw(self) -> bool {
        use IROpcode::*;
        if self.is_invoke() || self.is_field_op() || self.is_aget() || self.is_aput() {
            return true;
        }
        matches!(
            self,
            ConstString
                | ConstClass
                | MonitorEnter
                | MonitorExit
                | CheckCast
                | InstanceOf
                | ArrayLength
                | NewInstance
                | NewArray
                | FilledNewArray
                | FillArrayData
                | Throw
                | DivInt
                | RemInt
                | DivLong
                | RemLong
                | DivIntLit
                | RemIntLit
                | InitClass
        )
    }

    pub fn ref_kind(self) -> RefKind {
        use IROpcode::*;
        if self.is_field_op() {
            return RefKind::Field;
        }
        if self.is_invoke() {
            return RefKind::Method;
        }
        if self.is_binop_lit() || self.is_const() {
            return RefKind::Literal;
        }
        match self {
            ConstString => RefKind::String,
            ConstClass | CheckCast | InstanceOf | NewInstance | NewArray | FilledNewArray
            | InitClass => RefKind::Type,
            FillArrayData => RefKind::Data,
            _ => RefKind::None,
        }
    }

    pub fn has_range_form(self) -> bool {
        self.is_invoke() || self == IROpcode::FilledNewArray
    }

    /// Flip the sense of a conditional branch.
    pub fn invert_conditional_branch(self) -> Option<IROpcode> {
        use IROpcode::*;
        Some(match self {
            IfEq => IfNe,
            IfNe => IfEq,
            IfLt => IfGe,
            IfGe => IfLt,
            IfGt => IfLe,
            IfLe => IfGt,
            IfEqz => IfNez,
            IfNez => IfEqz,
            IfLtz => IfGez,
            IfGez => IfLtz,
            IfGtz => IfLez,
            IfLez => IfGtz,
            _ => return None,
        })
    }

    /// The destination holds a register pair.
    pub fn dest_is_wide(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            MoveWide
                | MoveResultWide
                | MoveResultPseudoWide
                | ConstWide
                | LoadParamWide
                | NegLong
                | NotLong
                | NegDouble
                | IntToLong
                | IntToDouble
                | LongToDouble
                | FloatToLong
                | FloatToDouble
                | DoubleToLong
        ) || (self.is_binop() && (AddLong..=UshrLong).contains(&self))
            || (self.is_binop() && (AddDouble..=RemDouble).contains(&self))
    }

    pub fn dest_is_object(self) -> bool {
        use IROpcode::*;
        matches!(
            self,
            MoveObject
                | MoveResultObject
                | MoveResultPseudoObject
                | MoveException
                | LoadParamObject
        )
    }

    /// Whether source `i` is a register pair. Invokes depend on the callee's
    /// prototype and are answered by the instruction.
    pub fn src_is_wide(self, i: usize) -> bool {
        use IROpcode::*;
        match self {
            MoveWide | ReturnWide | NegLong | NotLong | NegDouble | LongToInt | LongToFloat
            | LongToDouble | DoubleToInt | DoubleToLong | DoubleToFloat => i == 0,
            CmpLong | CmplDouble | CmpgDouble => i <= 1,
            AputWide | IputWide | SputWide => i == 0,
            ShlLong | ShrLong | UshrLong => i == 0,
            _ if (AddLong..=XorLong).contains(&self) => i <= 1,
            _ if (AddDouble..=RemDouble).contains(&self) => i <= 1,
            _ => false,
        }
    }

    /// Default encoding; widths of the IR form derive from it.
    pub fn default_dex_opcode(self) -> Option<DexOpcode> {
        use IROpcode as I;
        use DexOpcode as D;
        Some(match self {
            I::Nop => D::Nop,
            I::Move => D::Move16,
            I::MoveWide => D::MoveWide16,
            I::MoveObject => D::MoveObject16,
            I::MoveResult => D::MoveResult,
            I::MoveResultWide => D::MoveResultWide,
            I::MoveResultObject => D::MoveResultObject,
            I::MoveException => D::MoveException,
            I::ReturnVoid => D::ReturnVoid,
            I::Return => D::Return,
            I::ReturnWide => D::ReturnWide,
            I::ReturnObject => D::ReturnObject,
            I::Const => D::Const,
            I::ConstWide => D::ConstWide,
            I::ConstString => D::ConstString,
            I::ConstClass => D::ConstClass,
            I::MonitorEnter => D::MonitorEnter,
            I::MonitorExit => D::MonitorExit,
            I::CheckCast => D::CheckCast,
            I::InstanceOf => D::InstanceOf,
            I::ArrayLength => D::ArrayLength,
            I::NewInstance => D::NewInstance,
            I::NewArray => D::NewArray,
            I::FilledNewArray => D::FilledNewArray,
            I::FillArrayData => D::FillArrayData,
            I::Throw => D::Throw,
            I::Goto => D::Goto32,
            I::Switch => D::SparseSwitch,
            I::InvokeVirtual => D::InvokeVirtual,
            I::InvokeSuper => D::InvokeSuper,
            I::InvokeDirect => D::InvokeDirect,
            I::InvokeStatic => D::InvokeStatic,
            I::InvokeInterface => D::InvokeInterface,
            I::AddIntLit => D::AddIntLit8,
            I::RsubIntLit => D::RsubIntLit8,
            I::MulIntLit => D::MulIntLit8,
            I::DivIntLit => D::DivIntLit8,
            I::RemIntLit => D::RemIntLit8,
            I::AndIntLit => D::AndIntLit8,
            I::OrIntLit => D::OrIntLit8,
            I::XorIntLit => D::XorIntLit8,
            I::ShlIntLit => D::ShlIntLit8,
            I::ShrIntLit => D::ShrIntLit8,
            I::UshrIntLit => D::UshrIntLit8,
            _ if self.is_internal() => return None,
            _ => return self.positional_dex_opcode(),
        })
    }

    /// Opcodes that sit in the same relative position in both tables.
    fn positional_dex_opcode(self) -> Option<DexOpcode> {
        use IROpcode as I;
        let (ir_base, dex_base) = if (I::CmplFloat..=I::IfLez).contains(&self) {
            (I::CmplFloat, DexOpcode::CmplFloat)
        } else if (I::Aget..=I::SputShort).contains(&self) {
            (I::Aget, DexOpcode::Aget)
        } else if (I::NegInt..=I::RemDouble).contains(&self) {
            (I::NegInt, DexOpcode::NegInt)
        } else {
            return None;
        };
        let offset = self as usize - ir_base as usize;
        DexOpcode::from_byte(dex_base.to_byte() + offset as u8)
    }

    /// Fold an encoded opcode into the IR vocabulary.
    pub fn from_dex(op: DexOpcode) -> IROpcode {
        use DexOpcode as D;
        use IROpcode as I;
        match op {
            D::Nop => I::Nop,
            D::Move | D::MoveFrom16 | D::Move16 => I::Move,
            D::MoveWide | D::MoveWideFrom16 | D::MoveWide16 => I::MoveWide,
            D::MoveObject | D::MoveObjectFrom16 | D::MoveObject16 => I::MoveObject,
            D::MoveResult => I::MoveResult,
            D::MoveResultWide => I::MoveResultWide,
            D::MoveResultObject => I::MoveResultObject,
            D::MoveException => I::MoveException,
            D::ReturnVoid => I::ReturnVoid,
            D::Return => I::Return,
            D::ReturnWide => I::ReturnWide,
            D::ReturnObject => I::ReturnObject,
            D::Const4 | D::Const16 | D::Const | D::ConstHigh16 => I::Const,
            D::ConstWide16 | D::ConstWide32 | D::ConstWide | D::ConstWideHigh16 => I::ConstWide,
            D::ConstString | D::ConstStringJumbo => I::ConstString,
            D::ConstClass => I::ConstClass,
            D::MonitorEnter => I::MonitorEnter,
            D::MonitorExit => I::MonitorExit,
            D::CheckCast => I::CheckCast,
            D::InstanceOf => I::InstanceOf,
            D::ArrayLength => I::ArrayLength,
            D::NewInstance => I::NewInstance,
            D::NewArray => I::NewArray,
            D::FilledNewArray | D::FilledNewArrayRange => I::FilledNewArray,
            D::FillArrayData => I::FillArrayData,
            D::Throw => I::Throw,
            D::Goto | D::Goto16 | D::Goto32 => I::Goto,
            D::PackedSwitch | D::SparseSwitch => I::Switch,
            D::InvokeVirtual | D::InvokeVirtualRange => I::InvokeVirtual,
            D::InvokeSuper | D::InvokeSuperRange => I::InvokeSuper,
            D::InvokeDirect | D::InvokeDirectRange => I::InvokeDirect,
            D::InvokeStatic | D::InvokeStaticRange => I::InvokeStatic,
            D::InvokeInterface | D::InvokeInterfaceRange => I::InvokeInterface,
            D::AddIntLit16 | D::AddIntLit8 => I::AddIntLit,
            D::RsubInt | D::RsubIntLit8 => I::RsubIntLit,
            D::MulIntLit16 | D::MulIntLit8 => I::MulIntLit,
            D::DivIntLit16 | D::DivIntLit8 => I::DivIntLit,
            D::RemIntLit16 | D::RemIntLit8 => I::RemIntLit,
            D::AndIntLit16 | D::AndIntLit8 => I::AndIntLit,
            D::OrIntLit16 | D::OrIntLit8 => I::OrIntLit,
            D::XorIntLit16 | D::XorIntLit8 => I::XorIntLit,
            D::ShlIntLit8 => I::ShlIntLit,
            D::ShrIntLit8 => I::ShrIntLit,
            D::UshrIntLit8 => I::UshrIntLit,
            other => {
                let code = other.to_byte();
                let (dex_base, ir_base, code) = if (0xb0..=0xcf).contains(&code) {
                    (DexOpcode::AddInt2Addr, I::AddInt, code)
                } else if (0x2d..=0x3d).contains(&code) {
                    (DexOpcode::CmplFloat, I::CmplFloat, code)
                } else if (0x44..=0x6d).contains(&code) {
                    (DexOpcode::Aget, I::Aget, code)
                } else {
                    (DexOpcode::NegInt, I::NegInt, code)
                };
                let offset = (code - dex_base.to_byte()) as usize;
                I::ALL[ir_base as usize + offset]
            }
        }
    }
}

impl fmt::Display for IROpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
