//! Test utilities: loading synthesized containers and disassembling methods
//! with references resolved by name.

use dexproxy_bytecode::{ClassDefItem, DexFile, Instruction, RefKind};
use dexproxy_core::InterfaceDescription;

use crate::emit::HandlerBinding;
use crate::synth::Synthesizer;

pub const CALC: &str = "Lcom/example/Calc;";
pub const CALC_PROXY: &str = "Lcom/example/Calc$Proxy;";

/// `Calc$Proxy implements Calc { int add(int, int) }`.
pub fn calc() -> InterfaceDescription {
    InterfaceDescription::new(CALC_PROXY)
        .implements(CALC)
        .method("add", &["I", "I"], "I")
}

/// Load and fully verify a container.
pub fn load(bytes: Vec<u8>) -> DexFile {
    let dex = DexFile::from_bytes(bytes).expect("container should load");
    dex.verify().expect("container should verify");
    dex
}

pub fn synth(description: &InterfaceDescription) -> DexFile {
    synth_with(description, HandlerBinding::reflect())
}

pub fn synth_with(description: &InterfaceDescription, binding: HandlerBinding) -> DexFile {
    let out = Synthesizer::new(binding)
        .synthesize(description)
        .expect("synthesis should succeed");
    load(out.into_bytes())
}

pub fn class<'a>(dex: &'a DexFile, descriptor: &str) -> &'a ClassDefItem {
    dex.find_class(descriptor)
        .unwrap_or_else(|| panic!("class {descriptor} not found"))
}

/// `name(params)ret` of every method in `class`, direct methods first.
pub fn method_signatures(dex: &DexFile, descriptor: &str) -> Vec<String> {
    let data = class(dex, descriptor).class_data.as_ref().expect("class data");
    data.methods()
        .map(|m| {
            let r = dex.method_ref(m.method_idx).unwrap();
            format!("{}{}", r.name, r.descriptor)
        })
        .collect()
}

/// Decoded instructions of `class->name(...)`, with pool references rendered
/// by name instead of index.
pub fn disassemble(dex: &DexFile, descriptor: &str, signature: &str) -> String {
    let data = class(dex, descriptor).class_data.as_ref().expect("class data");
    let method = data
        .methods()
        .find(|m| {
            let r = dex.method_ref(m.method_idx).unwrap();
            format!("{}{}", r.name, r.descriptor) == signature
        })
        .unwrap_or_else(|| panic!("method {signature} not found"));
    let code = method.code.as_ref().expect("code item");

    let mut out = format!(
        "registers={} ins={} outs={}\n",
        code.registers_size, code.ins_size, code.outs_size
    );
    for (_, insn) in code.instructions().unwrap() {
        out.push_str(&render(dex, &insn));
        out.push('\n');
    }
    out
}

pub fn instructions(dex: &DexFile, descriptor: &str, signature: &str) -> Vec<Instruction> {
    let data = class(dex, descriptor).class_data.as_ref().expect("class data");
    data.methods()
        .find(|m| {
            let r = dex.method_ref(m.method_idx).unwrap();
            format!("{}{}", r.name, r.descriptor) == signature
        })
        .and_then(|m| m.code.as_ref())
        .map(|code| {
            code.instructions()
                .unwrap()
                .into_iter()
                .map(|(_, insn)| insn)
                .collect()
        })
        .unwrap_or_else(|| panic!("method {signature} not found"))
}

fn render(dex: &DexFile, insn: &Instruction) -> String {
    let mut line = insn.mnemonic().to_string();
    let operands = insn.operands();
    if !operands.is_empty() {
        line.push(' ');
        line.push_str(&operands);
    }
    if let Some(r) = insn.reference() {
        let target = match r.kind {
            RefKind::String => format!("{:?}", dex.string(r.index).unwrap()),
            RefKind::Type => dex.type_descriptor(r.index).unwrap().to_string(),
            RefKind::Field => {
                let f = dex.field_ref(r.index).unwrap();
                format!("{}->{}:{}", f.class, f.name, f.descriptor)
            }
            RefKind::Method => {
                let m = dex.method_ref(r.index).unwrap();
                format!("{}->{}{}", m.class, m.name, m.descriptor)
            }
        };
        line.push_str(", ");
        line.push_str(&target);
    }
    line
}
