//! Human-readable dump of a DEX file for debugging and tests.
//!
//! Sections are printed in file order: header, the five id pools, class
//! definitions with their disassembled code, and the map list. Pool entries
//! are prefixed with their index (`S3`, `T0`, `M12`, ...) padded to the width
//! of the largest index.

use dexproxy_core::{AccessFlags, Colors};

use super::dex_file::{ClassDefItem, CodeItem, DexError, DexFile, EncodedMethod};
use super::instructions::{Instruction, RefKind};
use super::NO_INDEX;

/// Render `file` as text.
pub fn dump(file: &DexFile, colors: Colors) -> Result<String, DexError> {
    let mut out = String::new();
    let ctx = DumpContext { file, colors };

    ctx.dump_header(&mut out);
    ctx.dump_pools(&mut out)?;
    ctx.dump_classes(&mut out)?;
    ctx.dump_map(&mut out);

    Ok(out)
}

struct DumpContext<'a> {
    file: &'a DexFile,
    colors: Colors,
}

fn width_for_count(count: usize) -> usize {
    count.saturating_sub(1).max(1).to_string().len()
}

impl DumpContext<'_> {
    fn section(&self, out: &mut String, name: &str) {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.colors.meta(&format!("[{name}]")));
        out.push('\n');
    }

    fn dump_header(&self, out: &mut String) {
        let h = self.file.header();
        let c = &self.colors;
        let signature: String = h.signature.iter().map(|b| format!("{b:02x}")).collect();
        let version = h.version().unwrap_or_default();

        self.section(out, "header");
        out.push_str(&format!("version   {version:03}\n"));
        out.push_str(&format!("file_size {}\n", h.file_size));
        out.push_str(&format!("checksum  {}\n", c.meta(&format!("{:#010x}", h.checksum))));
        out.push_str(&format!("signature {}\n", c.meta(&signature)));
    }

    fn dump_pools(&self, out: &mut String) -> Result<(), DexError> {
        let f = self.file;
        let c = &self.colors;

        self.section(out, "strings");
        let w = width_for_count(f.strings().len());
        for (i, s) in f.strings().iter().enumerate() {
            let index = c.meta(&format!("S{i:0w$}"));
            out.push_str(&format!("{index} {}\n", c.literal(&format!("{s:?}"))));
        }

        self.section(out, "types");
        let w = width_for_count(f.types().len());
        for i in 0..f.types().len() {
            let index = c.meta(&format!("T{i:0w$}"));
            let descriptor = f.type_descriptor(i as u32)?;
            out.push_str(&format!("{index} {}\n", c.literal(descriptor)));
        }

        self.section(out, "protos");
        let w = width_for_count(f.protos().len());
        for (i, proto) in f.protos().iter().enumerate() {
            let index = c.meta(&format!("P{i:0w$}"));
            let descriptor = f.proto_descriptor(i as u32)?;
            let shorty = f.string(proto.shorty_idx)?;
            out.push_str(&format!(
                "{index} {} {}\n",
                c.literal(&descriptor),
                c.meta(shorty)
            ));
        }

        self.section(out, "fields");
        let w = width_for_count(f.fields().len());
        for i in 0..f.fields().len() {
            let index = c.meta(&format!("F{i:0w$}"));
            out.push_str(&format!("{index} {}\n", self.field(i as u32)?));
        }

        self.section(out, "methods");
        let w = width_for_count(f.methods().len());
        for i in 0..f.methods().len() {
            let index = c.meta(&format!("M{i:0w$}"));
            out.push_str(&format!("{index} {}\n", self.method(i as u32)?));
        }
        Ok(())
    }

    fn field(&self, idx: u32) -> Result<String, DexError> {
        let r = self.file.field_ref(idx)?;
        Ok(format!(
            "{}->{}:{}",
            r.class,
            self.colors.name(r.name),
            self.colors.literal(&r.descriptor)
        ))
    }

    fn method(&self, idx: u32) -> Result<String, DexError> {
        let r = self.file.method_ref(idx)?;
        Ok(format!(
            "{}->{}{}",
            r.class,
            self.colors.name(r.name),
            self.colors.literal(&r.descriptor)
        ))
    }

    fn dump_classes(&self, out: &mut String) -> Result<(), DexError> {
        self.section(out, "classes");
        for (i, def) in self.file.class_defs().iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.dump_class(out, def)?;
        }
        Ok(())
    }

    fn dump_class(&self, out: &mut String, def: &ClassDefItem) -> Result<(), DexError> {
        let f = self.file;
        let c = &self.colors;

        let access = AccessFlags::from_bits(def.access_flags);
        let name = c.name(f.type_descriptor(def.class_idx)?);
        out.push_str(&format!("class {name} {}\n", c.meta(&access.to_string())));
        if def.superclass_idx != NO_INDEX {
            out.push_str(&format!("  extends {}\n", f.type_descriptor(def.superclass_idx)?));
        }
        for &iface in &def.interfaces {
            out.push_str(&format!("  implements {}\n", f.type_descriptor(iface as u32)?));
        }
        if def.source_file_idx != NO_INDEX {
            let source = f.string(def.source_file_idx)?;
            out.push_str(&format!("  source {}\n", c.literal(&format!("{source:?}"))));
        }

        let Some(data) = &def.class_data else {
            return Ok(());
        };
        for (label, fields) in [
            ("static field", &data.static_fields),
            ("field", &data.instance_fields),
        ] {
            for field in fields {
                let access = AccessFlags::from_bits(field.access_flags);
                out.push_str(&format!(
                    "  {label} {} {}\n",
                    self.field(field.field_idx)?,
                    c.meta(&access.to_string())
                ));
            }
        }
        for (label, methods) in [
            ("direct", &data.direct_methods),
            ("virtual", &data.virtual_methods),
        ] {
            for method in methods {
                self.dump_method(out, label, method)?;
            }
        }
        Ok(())
    }

    fn dump_method(
        &self,
        out: &mut String,
        label: &str,
        method: &EncodedMethod,
    ) -> Result<(), DexError> {
        let access = AccessFlags::from_bits(method.access_flags);
        out.push_str(&format!(
            "  {label} {} {}\n",
            self.method(method.method_idx)?,
            self.colors.meta(&access.to_string())
        ));
        if let Some(code) = &method.code {
            self.dump_code(out, code)?;
        }
        Ok(())
    }

    fn dump_code(&self, out: &mut String, code: &CodeItem) -> Result<(), DexError> {
        out.push_str(&format!(
            "    {}\n",
            self.colors.meta(&format!(
                "registers={} ins={} outs={}",
                code.registers_size, code.ins_size, code.outs_size
            ))
        ));
        for (pc, insn) in code.instructions()? {
            let pc = self.colors.meta(&format!("{pc:04x}"));
            out.push_str(&format!("    {pc} {}\n", self.instruction(&insn)?));
        }
        Ok(())
    }

    fn instruction(&self, insn: &Instruction) -> Result<String, DexError> {
        let mut text = insn.mnemonic().to_string();
        let operands = insn.operands();
        if !operands.is_empty() {
            text.push(' ');
            text.push_str(&operands);
        }
        if let Some(reference) = insn.reference() {
            let target = match reference.kind {
                RefKind::String => {
                    let s = self.file.string(reference.index)?;
                    self.colors.literal(&format!("{s:?}"))
                }
                RefKind::Type => self
                    .colors
                    .literal(self.file.type_descriptor(reference.index)?),
                RefKind::Field => self.field(reference.index)?,
                RefKind::Method => self.method(reference.index)?,
            };
            text.push_str(", ");
            text.push_str(&target);
        }
        Ok(text)
    }

    fn dump_map(&self, out: &mut String) {
        self.section(out, "map");
        for item in self.file.map_list() {
            out.push_str(&format!(
                "{} {} {}\n",
                self.colors.meta(&format!("{:#06x}", item.offset)),
                item.item_type.name(),
                item.size
            ));
        }
    }
}
