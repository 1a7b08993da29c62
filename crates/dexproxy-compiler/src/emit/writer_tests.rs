use dexproxy_bytecode::{DexFile, HEADER_SIZE, Instruction, InvokeKind, MapItemType, NO_INDEX};
use dexproxy_core::{AccessFlags, MethodSpec, OBJECT, ProtoDescriptor};

use super::encoder::{HandlerBinding, Insn, ProxyContext, encode, encode_constructor};
use super::layout::{ClassDefinition, assemble};
use super::pool::{Intern, PoolBuilder, Pools};
use super::writer::{lower, write};
use crate::SynthError;

fn proto(text: &str) -> ProtoDescriptor {
    ProtoDescriptor::parse(text).unwrap()
}

fn build(
    class: &str,
    superclass: &str,
    methods: &[(&str, &str)],
    pool: &mut PoolBuilder,
) -> ClassDefinition {
    let binding = HandlerBinding::reflect();
    let ctx = ProxyContext {
        class,
        binding: &binding,
    };
    let mut encoded = vec![encode_constructor(superclass, &ctx, pool).unwrap()];
    for (i, (name, descriptor)) in methods.iter().enumerate() {
        let spec = MethodSpec::new(*name, proto(descriptor), AccessFlags::PUBLIC);
        encoded.push(encode(&spec, i as u32, &ctx, pool).unwrap());
    }
    assemble(&ctx, superclass, &[], encoded, pool).unwrap()
}

fn pools_with(setup: impl FnOnce(&mut PoolBuilder)) -> Pools {
    let mut pool = PoolBuilder::new();
    setup(&mut pool);
    pool.finish().unwrap()
}

#[test]
fn const_width_selection() {
    let pools = pools_with(|_| {});
    let lowered = |dst, value| lower(&Insn::Const { dst, value }, &pools).unwrap();

    assert_eq!(lowered(3, 7), Instruction::Const4 { dst: 3, value: 7 });
    assert_eq!(lowered(3, -8), Instruction::Const4 { dst: 3, value: -8 });
    assert_eq!(lowered(3, 8), Instruction::Const16 { dst: 3, value: 8 });
    assert_eq!(lowered(16, 0), Instruction::Const16 { dst: 16, value: 0 });
    assert_eq!(
        lowered(3, -32768),
        Instruction::Const16 {
            dst: 3,
            value: -32768
        }
    );
    assert_eq!(
        lowered(3, 32768),
        Instruction::Const {
            dst: 3,
            value: 32768
        }
    );
}

#[test]
fn const_string_width_follows_final_index() {
    let mut pool = PoolBuilder::new();
    let narrow = pool.intern_string("a").unwrap();
    for i in 0..=u16::MAX as u32 {
        pool.intern_string(&format!("s{i:05}")).unwrap();
    }
    let wide = pool.intern_string("zz").unwrap();
    let pools = pool.finish().unwrap();

    assert_eq!(
        lower(&Insn::ConstString { dst: 1, string: narrow }, &pools).unwrap(),
        Instruction::ConstString { dst: 1, string: 0 }
    );
    assert_eq!(
        lower(&Insn::ConstString { dst: 1, string: wide }, &pools).unwrap(),
        Instruction::ConstStringJumbo {
            dst: 1,
            string: 65537
        }
    );
}

#[test]
fn invoke_form_selection() {
    let mut pool = PoolBuilder::new();
    let method = pool.intern_method("LA;", "m", &proto("()V")).unwrap();
    let pools = pool.finish().unwrap();
    let lowered = |args: Vec<u16>| {
        lower(
            &Insn::Invoke {
                kind: InvokeKind::Static,
                method,
                args,
            },
            &pools,
        )
    };

    assert_eq!(
        lowered(vec![0, 5, 1, 2, 15]).unwrap(),
        Instruction::Invoke {
            kind: InvokeKind::Static,
            method: 0,
            args: vec![0, 5, 1, 2, 15],
        }
    );
    assert_eq!(
        lowered(vec![16, 17]).unwrap(),
        Instruction::InvokeRange {
            kind: InvokeKind::Static,
            method: 0,
            first: 16,
            count: 2,
        }
    );
    assert_eq!(
        lowered(vec![1, 2, 3, 4, 5, 6]).unwrap(),
        Instruction::InvokeRange {
            kind: InvokeKind::Static,
            method: 0,
            first: 1,
            count: 6,
        }
    );
    assert!(matches!(
        lowered(vec![0, 16]).unwrap_err(),
        SynthError::Encoding(_)
    ));
}

#[test]
fn narrow_register_checked() {
    let mut pool = PoolBuilder::new();
    let field = pool.intern_field("LA;", "f", "LB;").unwrap();
    let pools = pool.finish().unwrap();

    let err = lower(
        &Insn::IgetObject {
            dst: 0,
            object: 16,
            field,
        },
        &pools,
    )
    .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"encoding error: register v16 does not fit a 4-bit operand");
}

#[test]
fn move_object_lowers_to_from16() {
    let pools = pools_with(|_| {});

    assert_eq!(
        lower(&Insn::MoveObject { dst: 4, src: 300 }, &pools).unwrap(),
        Instruction::MoveObjectFrom16 { dst: 4, src: 300 }
    );
}

#[test]
fn section_layout() {
    let mut pool = PoolBuilder::new();
    let class = build("LFoo;", OBJECT, &[("f", "(I)J")], &mut pool);
    let pools = pool.finish().unwrap();

    let bytes = write(std::slice::from_ref(&class), &pools).unwrap();
    let dex = DexFile::from_bytes(bytes).unwrap();
    dex.verify().unwrap();
    let h = dex.header();

    assert_eq!(h.string_ids_off, HEADER_SIZE as u32);
    assert_eq!(h.type_ids_off, h.string_ids_off + 4 * h.string_ids_size);
    assert_eq!(h.proto_ids_off, h.type_ids_off + 4 * h.type_ids_size);
    assert_eq!(h.field_ids_off, h.proto_ids_off + 12 * h.proto_ids_size);
    assert_eq!(h.method_ids_off, h.field_ids_off + 8 * h.field_ids_size);
    assert_eq!(h.class_defs_off, h.method_ids_off + 8 * h.method_ids_size);
    assert_eq!(h.data_off, h.class_defs_off + 32 * h.class_defs_size);
    assert_eq!(h.data_off + h.data_size, h.file_size);
    assert_eq!(h.map_off % 4, 0);
    assert_eq!(h.link_size, 0);

    let kinds: Vec<MapItemType> = dex.map_list().iter().map(|m| m.item_type).collect();
    assert_eq!(
        kinds,
        [
            MapItemType::Header,
            MapItemType::StringId,
            MapItemType::TypeId,
            MapItemType::ProtoId,
            MapItemType::FieldId,
            MapItemType::MethodId,
            MapItemType::ClassDef,
            MapItemType::CodeItem,
            MapItemType::TypeList,
            MapItemType::StringData,
            MapItemType::ClassData,
            MapItemType::MapList,
        ]
    );
    for item in dex.map_list() {
        if matches!(
            item.item_type,
            MapItemType::CodeItem | MapItemType::TypeList | MapItemType::MapList
        ) {
            assert_eq!(item.offset % 4, 0, "{:?}", item.item_type);
        }
    }
}

#[test]
fn code_items_are_aligned() {
    let mut pool = PoolBuilder::new();
    let class = build(
        "LFoo;",
        OBJECT,
        &[("a", "()V"), ("b", "(Z)V"), ("c", "(JJ)D")],
        &mut pool,
    );
    let pools = pool.finish().unwrap();

    let dex = DexFile::from_bytes(write(&[class], &pools).unwrap()).unwrap();
    let data = dex.class_defs()[0].class_data.as_ref().unwrap();
    for method in data.methods() {
        assert_eq!(method.code_off % 4, 0);
        assert_eq!(method.code.as_ref().unwrap().tries_size, 0);
    }
}

#[test]
fn class_data_sorted_by_method_index() {
    let mut pool = PoolBuilder::new();
    let class = build("LFoo;", OBJECT, &[("z", "()V"), ("a", "()V")], &mut pool);
    let pools = pool.finish().unwrap();

    let dex = DexFile::from_bytes(write(&[class], &pools).unwrap()).unwrap();
    let data = dex.class_defs()[0].class_data.as_ref().unwrap();
    let indices: Vec<u32> = data.virtual_methods.iter().map(|m| m.method_idx).collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(dex.method_ref(indices[0]).unwrap().name, "a");
}

#[test]
fn type_lists_deduplicated() {
    let mut pool = PoolBuilder::new();
    let class = build(
        "LFoo;",
        OBJECT,
        &[("a", "(I)V"), ("b", "(I)I"), ("c", "(I)Z")],
        &mut pool,
    );
    let pools = pool.finish().unwrap();

    let dex = DexFile::from_bytes(write(&[class], &pools).unwrap()).unwrap();
    let with_int: Vec<u32> = dex
        .protos()
        .iter()
        .filter(|p| {
            p.parameters.len() == 1 && dex.type_descriptor(p.parameters[0] as u32).unwrap() == "I"
        })
        .map(|p| p.parameters_off)
        .collect();
    assert!(with_int.len() >= 3);
    assert!(with_int.iter().all(|&off| off == with_int[0]));

    let no_params = dex.protos().iter().find(|p| p.parameters.is_empty()).unwrap();
    assert_eq!(no_params.parameters_off, 0);
}

#[test]
fn absent_fields_use_no_index() {
    let mut pool = PoolBuilder::new();
    let class = build("LFoo;", OBJECT, &[], &mut pool);
    let pools = pool.finish().unwrap();

    let dex = DexFile::from_bytes(write(&[class], &pools).unwrap()).unwrap();
    let def = &dex.class_defs()[0];
    assert_eq!(def.source_file_idx, NO_INDEX);
    assert_eq!(def.interfaces_off, 0);
    assert_eq!(def.annotations_off, 0);
    assert_eq!(def.static_values_off, 0);
}

#[test]
fn superclass_defined_first() {
    let mut pool = PoolBuilder::new();
    let child = build("LChild;", "LParent;", &[], &mut pool);
    let parent = build("LParent;", OBJECT, &[], &mut pool);
    let pools = pool.finish().unwrap();

    let dex = DexFile::from_bytes(write(&[child, parent], &pools).unwrap()).unwrap();
    let first = dex.type_descriptor(dex.class_defs()[0].class_idx).unwrap();
    assert_eq!(first, "LParent;");
}

#[test]
fn duplicate_class_rejected() {
    let mut pool = PoolBuilder::new();
    let a = build("LFoo;", OBJECT, &[], &mut pool);
    let b = build("LFoo;", OBJECT, &[], &mut pool);
    let pools = pool.finish().unwrap();

    let err = write(&[a, b], &pools).unwrap_err();
    assert!(matches!(err, SynthError::Conflict { ref reason, .. } if reason == "class defined more than once"));
}

#[test]
fn byte_identical_output() {
    let run = || {
        let mut pool = PoolBuilder::new();
        let class = build("LFoo;", OBJECT, &[("f", "(Ljava/lang/String;)V")], &mut pool);
        let pools = pool.finish().unwrap();
        write(&[class], &pools).unwrap()
    };

    assert_eq!(run(), run());
}

#[test]
fn reader_rejects_repeated_interface() {
    let mut pool = PoolBuilder::new();
    let mut class = build("LFoo;", OBJECT, &[], &mut pool);
    let runnable = pool.intern_type("Ljava/lang/Runnable;").unwrap();
    class.interfaces = vec![runnable, runnable];
    let pools = pool.finish().unwrap();

    let dex = DexFile::from_bytes(write(&[class], &pools).unwrap()).unwrap();
    let err = dex.verify().unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"class `LFoo;` lists interface `Ljava/lang/Runnable;` more than once");
}
