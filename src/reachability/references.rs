//! What an entity refers to.
//!
//! Gathering is purely syntactic: symbols are collected as they appear and
//! resolution happens in the closure.

use super::IgnoreSets;
use crate::cfg::ControlFlowGraph;
use crate::dex::resolver::opcode_to_search;
use crate::dex::type_util::{get_array_element_type, is_class_type};
use crate::dex::{
    DexAnnotationSet, DexFieldRef, DexMethodRef, DexProto, DexString, DexType, FieldSearch,
    MethodSearch,
};
use crate::ir::{IRCode, IRInstruction, IROpcode};

/// How a method symbol is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `invoke-virtual` / `invoke-interface`.
    Virtual,
    /// `invoke-direct` / `invoke-super`.
    Direct,
    Static,
    /// Named without being invoked, e.g. in an annotation.
    Mentioned,
}

impl CallKind {
    pub fn of(op: IROpcode) -> Self {
        match op {
            IROpcode::InvokeVirtual | IROpcode::InvokeInterface => CallKind::Virtual,
            IROpcode::InvokeDirect | IROpcode::InvokeSuper => CallKind::Direct,
            IROpcode::InvokeStatic => CallKind::Static,
            _ => CallKind::Mentioned,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct References {
    pub types: Vec<DexType>,
    pub annos: Vec<DexType>,
    pub strings: Vec<DexString>,
    pub fields: Vec<(DexFieldRef, FieldSearch)>,
    pub methods: Vec<(DexMethodRef, MethodSearch, CallKind)>,
    pub new_instances: Vec<DexType>,
    /// Static types of the objects whose instance members are touched.
    pub instance_receivers: Vec<DexType>,
}

impl References {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.annos.is_empty()
            && self.strings.is_empty()
            && self.fields.is_empty()
            && self.methods.is_empty()
    }

    /// Record `ty`, or the element type of an array.
    pub fn add_type(&mut self, ty: DexType) {
        let elem = get_array_element_type(ty).unwrap_or(ty);
        if is_class_type(elem) {
            self.types.push(elem);
        }
    }

    pub fn add_proto(&mut self, proto: DexProto) {
        self.add_type(proto.return_type());
        for arg in proto.args().iter() {
            self.add_type(arg);
        }
    }

    pub fn add_annotations(&mut self, annos: &DexAnnotationSet, ignore: &IgnoreSets) {
        for ty in annos.types() {
            if !ignore.system_annos.contains(&ty) {
                self.annos.push(ty);
            }
        }
        let mut types = Vec::new();
        annos.gather_types(&mut types);
        for ty in types {
            self.add_type(ty);
        }
        let mut fields = Vec::new();
        annos.gather_fields(&mut fields);
        self.fields.extend(fields.into_iter().map(|f| (f, FieldSearch::Any)));
        let mut methods = Vec::new();
        annos.gather_methods(&mut methods);
        self.methods.extend(
            methods
                .into_iter()
                .map(|m| (m, MethodSearch::Any, CallKind::Mentioned)),
        );
    }

    pub fn add_insn(&mut self, insn: &IRInstruction) {
        let op = insn.opcode();
        if let Some(s) = insn.get_string() {
            self.strings.push(s);
        }
        if let Some(ty) = insn.get_type() {
            self.add_type(ty);
            if op == IROpcode::NewInstance {
                self.new_instances.push(ty);
            }
        }
        if let Some(fref) = insn.get_field() {
            let search = if op.is_sfield_op() {
                FieldSearch::Static
            } else if op.is_ifield_op() {
                self.instance_receivers.push(fref.class_type());
                FieldSearch::Instance
            } else {
                FieldSearch::Any
            };
            self.fields.push((fref, search));
        }
        if let Some(mref) = insn.get_method() {
            let kind = CallKind::of(op);
            if matches!(kind, CallKind::Virtual | CallKind::Direct) && !mref.is_constructor() {
                self.instance_receivers.push(mref.class_type());
            }
            self.methods.push((mref, opcode_to_search(op), kind));
        }
    }

    /// Every instruction of `code`, or with `reachable_only` every
    /// instruction of a block reachable from the entry.
    pub fn add_code(&mut self, code: &IRCode, reachable_only: bool) {
        if !reachable_only {
            for insn in code.instructions() {
                self.add_insn(insn);
            }
            return;
        }
        match code.cfg() {
            Some(cfg) => self.add_reachable_blocks(cfg),
            None => match ControlFlowGraph::build(code.list(), false) {
                Ok(cfg) => self.add_reachable_blocks(&cfg),
                Err(_) => {
                    for insn in code.instructions() {
                        self.add_insn(insn);
                    }
                }
            },
        }
    }

    fn add_reachable_blocks(&mut self, cfg: &ControlFlowGraph) {
        for b in cfg.reachable_blocks() {
            if let Some(block) = cfg.block(b) {
                for (_, insn) in block.instructions() {
                    self.add_insn(insn);
                }
            }
        }
    }
}

/// The class a string literal names, if it spells an existing type either
/// as a descriptor or as a dotted Java name.
pub fn class_named_by_string(s: DexString) -> Option<DexType> {
    let text = s.as_str();
    if text.is_empty() || text.contains(char::is_whitespace) {
        return None;
    }
    let ty = if text.starts_with('L') && text.ends_with(';') {
        DexType::get(text)
    } else {
        DexType::get(&format!("L{};", text.replace('.', "/")))
    }?;
    ty.class().map(|cls| cls.get_type())
}
