use dexproxy_bytecode::{Instruction, checksum};
use dexproxy_core::{AccessFlags, AccessKeyword, InterfaceDescription, MethodDescription};

use crate::emit::encoder::INVOCATION_HANDLER;
use crate::test_utils::{
    CALC, CALC_PROXY, calc, class, disassemble, instructions, load, method_signatures, synth,
    synth_with,
};
use crate::{
    HandlerBinding, HandlerProtocol, MethodIdentity, SynthError, Synthesizer, derive_specs,
    synthesize,
};

#[test]
fn add_delegates_to_handler() {
    let dex = synth(&calc());

    insta::assert_snapshot!(disassemble(&dex, CALC_PROXY, "add(II)I"), @r#"
    registers=8 ins=3 outs=4
    iget-object v0, v5, Lcom/example/Calc$Proxy;->$__handler:Ljava/lang/reflect/InvocationHandler;
    sget-object v1, Lcom/example/Calc$Proxy;->$__methodArray:[Ljava/lang/reflect/Method;
    const/4 v3, #0
    aget-object v1, v1, v3
    const/4 v3, #2
    new-array v2, v3, [Ljava/lang/Object;
    const/4 v3, #0
    invoke-static {v6}, Ljava/lang/Integer;->valueOf(I)Ljava/lang/Integer;
    move-result-object v4
    aput-object v4, v2, v3
    const/4 v3, #1
    invoke-static {v7}, Ljava/lang/Integer;->valueOf(I)Ljava/lang/Integer;
    move-result-object v4
    aput-object v4, v2, v3
    invoke-interface {v0, v5, v1, v2}, Ljava/lang/reflect/InvocationHandler;->invoke(Ljava/lang/Object;Ljava/lang/reflect/Method;[Ljava/lang/Object;)Ljava/lang/Object;
    move-result-object v0
    check-cast v0, Ljava/lang/Integer;
    invoke-virtual {v0}, Ljava/lang/Integer;->intValue()I
    move-result v0
    return v0
    "#);
}

#[test]
fn constructor_stores_handler() {
    let dex = synth(&calc());

    insta::assert_snapshot!(
        disassemble(&dex, CALC_PROXY, "<init>(Ljava/lang/reflect/InvocationHandler;)V"),
        @r#"
    registers=2 ins=2 outs=1
    invoke-direct {v0}, Ljava/lang/Object;-><init>()V
    iput-object v1, v0, Lcom/example/Calc$Proxy;->$__handler:Ljava/lang/reflect/InvocationHandler;
    return-void
    "#
    );
}

#[test]
fn class_shape() {
    let dex = synth(&calc());
    let def = class(&dex, CALC_PROXY);

    assert_eq!(
        def.access_flags,
        (AccessFlags::PUBLIC | AccessFlags::FINAL).bits()
    );
    assert_eq!(
        dex.type_descriptor(def.superclass_idx).unwrap(),
        "Ljava/lang/Object;"
    );
    let interfaces: Vec<&str> = def
        .interfaces
        .iter()
        .map(|&t| dex.type_descriptor(t as u32).unwrap())
        .collect();
    assert_eq!(interfaces, [CALC]);

    let data = def.class_data.as_ref().unwrap();
    assert_eq!(data.static_fields.len(), 1);
    assert_eq!(data.instance_fields.len(), 1);
    assert_eq!(data.direct_methods.len(), 1);
    assert_eq!(data.virtual_methods.len(), 1);

    let handler = dex.field_ref(data.instance_fields[0].field_idx).unwrap();
    assert_eq!(handler.name, "$__handler");
    assert_eq!(handler.descriptor, INVOCATION_HANDLER);
    assert_eq!(
        data.instance_fields[0].access_flags,
        (AccessFlags::PRIVATE | AccessFlags::FINAL).bits()
    );
    assert_eq!(
        data.virtual_methods[0].access_flags,
        AccessFlags::PUBLIC.bits()
    );
    assert_eq!(
        data.direct_methods[0].access_flags,
        (AccessFlags::PUBLIC | AccessFlags::CONSTRUCTOR).bits()
    );
}

#[test]
fn round_trip_method_names() {
    let description = InterfaceDescription::new("LShapes$Proxy;")
        .implements("LShapes;")
        .method("area", &["D", "D"], "D")
        .method("name", &[], "Ljava/lang/String;")
        .method("scale", &["[I", "F"], "V");
    let dex = synth(&description);

    assert_eq!(
        method_signatures(&dex, "LShapes$Proxy;"),
        [
            "<init>(Ljava/lang/reflect/InvocationHandler;)V",
            "area(DD)D",
            "name()Ljava/lang/String;",
            "scale([IF)V",
        ]
    );
}

#[test]
fn deterministic_output() {
    let a = Synthesizer::default().synthesize(&calc()).unwrap();
    let b = Synthesizer::default().synthesize(&calc()).unwrap();

    assert_eq!(a.bytes(), b.bytes());
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.fingerprint(), crc32fast::hash(a.bytes()));
}

#[test]
fn checksum_and_signature_match_header() {
    let bytes = synthesize(&calc(), &HandlerBinding::reflect()).unwrap();
    let dex = load(bytes.clone());

    assert_eq!(dex.header().checksum, checksum::compute_checksum(&bytes));
    assert_eq!(dex.header().signature, checksum::compute_signature(&bytes));
    assert_eq!(dex.header().file_size as usize, bytes.len());
}

#[test]
fn void_method_without_parameters() {
    let description = InterfaceDescription::new("LRunnable$Proxy;")
        .implements("Ljava/lang/Runnable;")
        .method("run", &[], "V");
    let dex = synth(&description);

    let code = instructions(&dex, "LRunnable$Proxy;", "run()V");
    assert!(
        !code
            .iter()
            .any(|i| matches!(i, Instruction::AputObject { .. }))
    );
    assert!(!code.iter().any(|i| matches!(i, Instruction::CheckCast { .. })));
    assert!(
        !code
            .iter()
            .any(|i| matches!(i, Instruction::MoveResultObject { .. }))
    );
    assert_eq!(code.last(), Some(&Instruction::ReturnVoid));
}

#[test]
fn overloads_are_distinct() {
    let description = InterfaceDescription::new("LPrinter$Proxy;")
        .implements("LPrinter;")
        .method("print", &["I"], "V")
        .method("print", &["Ljava/lang/String;"], "V");
    let dex = synth(&description);

    assert_eq!(
        method_signatures(&dex, "LPrinter$Proxy;"),
        [
            "<init>(Ljava/lang/reflect/InvocationHandler;)V",
            "print(I)V",
            "print(Ljava/lang/String;)V",
        ]
    );
}

#[test]
fn duplicate_signature_conflicts() {
    let description = calc().method("add", &["I", "I"], "I");

    let err = Synthesizer::default().synthesize(&description).unwrap_err();
    assert_eq!(
        err,
        SynthError::Conflict {
            method: "Lcom/example/Calc$Proxy;->add(II)I".to_string(),
            reason: "declared more than once".to_string(),
        }
    );
}

#[test]
fn unknown_parameter_type() {
    let description = calc().method("frob", &["Q"], "V");

    let err = synthesize(&description, &HandlerBinding::reflect()).unwrap_err();
    assert!(matches!(
        err,
        SynthError::UnsupportedSignature { ref method, .. } if method == "frob(Q)V"
    ));
}

#[test]
fn void_parameter_rejected() {
    let description = calc().method("frob", &["V"], "V");

    let err = synthesize(&description, &HandlerBinding::reflect()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"unsupported signature for `frob(V)V`: parameter 0 has type `V`");
}

#[test]
fn invalid_class_name() {
    let description = InterfaceDescription::new("com.example.Calc").method("x", &[], "V");

    let err = synthesize(&description, &HandlerBinding::reflect()).unwrap_err();
    assert!(matches!(err, SynthError::Encoding(_)));
}

#[test]
fn class_name_outside_simple_name_rule() {
    let description = InterfaceDescription::new("LP!;").method("x", &[], "V");

    let err = synthesize(&description, &HandlerBinding::reflect()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"encoding error: LP!;: class name: invalid type descriptor `LP!;`: illegal character in class name");
}

#[test]
fn method_name_outside_simple_name_rule() {
    let description = calc().method("a+b", &["I"], "V");

    let err = synthesize(&description, &HandlerBinding::reflect()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"unsupported signature for `a+b(I)V`: invalid method name");
}

#[test]
fn parameter_class_outside_simple_name_rule() {
    let description = calc().method("frob", &["LFoo#Bar;"], "V");

    let err = synthesize(&description, &HandlerBinding::reflect()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"unsupported signature for `frob(LFoo#Bar;)V`: parameter 0: invalid type descriptor `LFoo#Bar;`: illegal character in class name");
}

#[test]
fn handler_field_names_checked() {
    let binding = HandlerBinding::reflect().with_field("my handler");
    let err = synthesize(&calc(), &binding).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"encoding error: invalid handler field name `my handler`");

    let binding = HandlerBinding::new(HandlerProtocol::new(
        INVOCATION_HANDLER,
        MethodIdentity::MethodArray {
            field: "methods[]".to_string(),
        },
    ));
    let err = synthesize(&calc(), &binding).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"encoding error: invalid method array field name `methods[]`");
}

#[test]
fn unicode_names_accepted() {
    let description = InterfaceDescription::new("Lcaf\u{e9}/Proxy$1;").method("\u{4e2d}-_$", &[], "V");

    let dex = synth(&description);
    assert_eq!(
        method_signatures(&dex, "Lcaf\u{e9}/Proxy$1;"),
        ["<init>(Ljava/lang/reflect/InvocationHandler;)V", "\u{4e2d}-_$()V"]
    );
}

#[test]
fn duplicate_interface_conflicts() {
    let description = calc().implements(CALC);

    let err = synthesize(&description, &HandlerBinding::reflect()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"conflict on `Lcom/example/Calc$Proxy; implements Lcom/example/Calc;`: interface listed more than once");
}

#[test]
fn derive_specs_skips_unoverridable() {
    let description = InterfaceDescription::new("LBase$Proxy;")
        .with_method(MethodDescription::new("helper", &[], "V").with_access(&[
            AccessKeyword::Public,
            AccessKeyword::Static,
        ]))
        .with_method(MethodDescription::new("secret", &[], "V").with_access(&[AccessKeyword::Private]))
        .with_method(MethodDescription::new("<init>", &[], "V").with_access(&[AccessKeyword::Public]))
        .with_method(
            MethodDescription::new("hook", &["J"], "Z").with_access(&[AccessKeyword::Protected]),
        )
        .method("run", &[], "V");

    let specs = derive_specs(&description).unwrap();
    let names: Vec<String> = specs.iter().map(|s| s.signature()).collect();
    assert_eq!(names, ["hook(J)Z", "run()V"]);
}

#[test]
fn final_method_conflicts() {
    let description = InterfaceDescription::new("LBase$Proxy;").with_method(
        MethodDescription::new("locked", &[], "V")
            .with_access(&[AccessKeyword::Public, AccessKeyword::Final]),
    );

    let err = derive_specs(&description).unwrap_err();
    assert!(matches!(err, SynthError::Conflict { .. }));
}

#[test]
fn protected_and_varargs_access_kept() {
    let description = InterfaceDescription::new("LBase$Proxy;")
        .extends("LBase;")
        .with_method(MethodDescription::new("hook", &[], "V").with_access(&[
            AccessKeyword::Protected,
            AccessKeyword::Abstract,
        ]))
        .with_method(
            MethodDescription::new("log", &["[Ljava/lang/Object;"], "V").with_access(&[
                AccessKeyword::Public,
                AccessKeyword::Varargs,
                AccessKeyword::Native,
            ]),
        );
    let dex = synth(&description);

    let data = class(&dex, "LBase$Proxy;").class_data.as_ref().unwrap();
    let access: Vec<(String, u32)> = data
        .virtual_methods
        .iter()
        .map(|m| {
            let r = dex.method_ref(m.method_idx).unwrap();
            (r.name.to_string(), m.access_flags)
        })
        .collect();
    assert_eq!(
        access,
        [
            ("hook".to_string(), AccessFlags::PROTECTED.bits()),
            (
                "log".to_string(),
                (AccessFlags::PUBLIC | AccessFlags::VARARGS).bits()
            ),
        ]
    );
    let init = disassemble(&dex, "LBase$Proxy;", "<init>(Ljava/lang/reflect/InvocationHandler;)V");
    assert!(init.contains("invoke-direct {v0}, LBase;-><init>()V"));
}

#[test]
fn wide_return_and_parameters() {
    let description = InterfaceDescription::new("LClock$Proxy;").method("at", &["J", "I"], "J");
    let dex = synth(&description);

    insta::assert_snapshot!(disassemble(&dex, "LClock$Proxy;", "at(JI)J"), @r#"
    registers=9 ins=4 outs=4
    iget-object v0, v5, LClock$Proxy;->$__handler:Ljava/lang/reflect/InvocationHandler;
    sget-object v1, LClock$Proxy;->$__methodArray:[Ljava/lang/reflect/Method;
    const/4 v3, #0
    aget-object v1, v1, v3
    const/4 v3, #2
    new-array v2, v3, [Ljava/lang/Object;
    const/4 v3, #0
    invoke-static {v6, v7}, Ljava/lang/Long;->valueOf(J)Ljava/lang/Long;
    move-result-object v4
    aput-object v4, v2, v3
    const/4 v3, #1
    invoke-static {v8}, Ljava/lang/Integer;->valueOf(I)Ljava/lang/Integer;
    move-result-object v4
    aput-object v4, v2, v3
    invoke-interface {v0, v5, v1, v2}, Ljava/lang/reflect/InvocationHandler;->invoke(Ljava/lang/Object;Ljava/lang/reflect/Method;[Ljava/lang/Object;)Ljava/lang/Object;
    move-result-object v0
    check-cast v0, Ljava/lang/Long;
    invoke-virtual {v0}, Ljava/lang/Long;->longValue()J
    move-result-wide v0
    return-wide v0
    "#);
}

#[test]
fn high_registers_use_range_forms() {
    let params = ["J"; 6];
    let description = InterfaceDescription::new("LWide$Proxy;")
        .method("sum", &params, "V")
        .method("pick", &["I", "I", "I", "I", "I", "I", "I", "I", "I", "I", "I"], "Ljava/lang/String;");
    let dex = synth(&description);

    let sum = instructions(&dex, "LWide$Proxy;", "sum(JJJJJJ)V");
    let ranges: Vec<(u16, u8)> = sum
        .iter()
        .filter_map(|i| match i {
            Instruction::InvokeRange { first, count, .. } => Some((*first, *count)),
            _ => None,
        })
        .collect();
    // v6..v17: pairs from v16 on no longer fit 4-bit registers.
    assert_eq!(ranges, [(16, 2)]);

    let pick = instructions(&dex, "LWide$Proxy;", "pick(IIIIIIIIIII)Ljava/lang/String;");
    assert!(pick.contains(&Instruction::Const16 { dst: 3, value: 10 }));
    assert!(pick.iter().any(|i| matches!(
        i,
        Instruction::InvokeRange {
            first: 16,
            count: 1,
            ..
        }
    )));
    assert!(pick.iter().any(|i| matches!(i, Instruction::CheckCast { reg: 0, .. })));
    assert_eq!(pick.last(), Some(&Instruction::ReturnObject { reg: 0 }));
}

#[test]
fn reference_parameter_above_255() {
    let params = vec!["Ljava/lang/String;"; 251];
    let description = InterfaceDescription::new("LHuge$Proxy;").method("many", &params, "V");
    let dex = synth(&description);

    let signature = format!("many({})V", "Ljava/lang/String;".repeat(251));
    let code = instructions(&dex, "LHuge$Proxy;", &signature);
    assert!(code.contains(&Instruction::MoveObjectFrom16 { dst: 4, src: 256 }));
    assert!(code.contains(&Instruction::AputObject {
        src: 255,
        array: 2,
        index: 3
    }));
}

#[test]
fn index_protocol() {
    let binding = HandlerBinding::new(HandlerProtocol::new("LHandler;", MethodIdentity::Index))
        .with_field("h");
    let description = calc().method("neg", &["I"], "I");
    let dex = synth_with(&description, binding);

    let data = class(&dex, CALC_PROXY).class_data.as_ref().unwrap();
    assert!(data.static_fields.is_empty());

    let neg = disassemble(&dex, CALC_PROXY, "neg(I)I");
    insta::assert_snapshot!(neg.lines().take(4).collect::<Vec<_>>().join("\n"), @r"
    registers=7 ins=2 outs=4
    iget-object v0, v5, Lcom/example/Calc$Proxy;->h:LHandler;
    const/4 v1, #1
    const/4 v3, #1
    ");
    assert!(neg.contains(
        "invoke-interface {v0, v5, v1, v2}, LHandler;->invoke(Ljava/lang/Object;I[Ljava/lang/Object;)Ljava/lang/Object;"
    ));
}

#[test]
fn name_protocol() {
    let binding = HandlerBinding::new(HandlerProtocol::new("LHandler;", MethodIdentity::Name));
    let dex = synth_with(&calc(), binding);

    let add = disassemble(&dex, CALC_PROXY, "add(II)I");
    assert!(add.contains("const-string v1, \"add(II)I\""));
    assert!(add.contains(
        "LHandler;->invoke(Ljava/lang/Object;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;"
    ));
}

#[test]
fn class_handler_uses_invoke_virtual() {
    let mut protocol = HandlerProtocol::new("LBaseHandler;", MethodIdentity::Index);
    protocol.handler_is_interface = false;
    protocol.invoke_name = "dispatch".to_string();
    let dex = synth_with(&calc(), HandlerBinding::new(protocol));

    let add = disassemble(&dex, CALC_PROXY, "add(II)I");
    assert!(add.contains("invoke-virtual {v0, v5, v1, v2}, LBaseHandler;->dispatch("));
}

#[test]
fn batch_writes_all_classes() {
    let descriptions = [
        calc(),
        InterfaceDescription::new("LRunnable$Proxy;")
            .implements("Ljava/lang/Runnable;")
            .method("run", &[], "V"),
        InterfaceDescription::new("LShapes$Proxy;").method("area", &["D"], "D"),
    ];

    let synthesizer = Synthesizer::default();
    let batch = synthesizer.synthesize_batch(&descriptions).unwrap();
    let again = synthesizer.synthesize_batch(&descriptions).unwrap();
    assert_eq!(batch, again);

    let dex = load(batch.into_bytes());
    assert_eq!(dex.class_defs().len(), 3);
    for description in &descriptions {
        assert_eq!(
            method_signatures(&dex, &description.name).len(),
            description.methods.len() + 1
        );
    }
}

#[test]
fn batch_larger_than_worker_count() {
    let descriptions: Vec<InterfaceDescription> = (0..64)
        .map(|i| InterfaceDescription::new(format!("LP{i};")).method("run", &[], "V"))
        .collect();

    let synthesizer = Synthesizer::default();
    let batch = synthesizer.synthesize_batch(&descriptions).unwrap();
    assert_eq!(batch, synthesizer.synthesize_batch(&descriptions).unwrap());

    let dex = load(batch.into_bytes());
    assert_eq!(dex.class_defs().len(), 64);
    for description in &descriptions {
        assert_eq!(method_signatures(&dex, &description.name).len(), 2);
    }
}

#[test]
fn batch_orders_supertypes_first() {
    let descriptions = [
        InterfaceDescription::new("LChild;")
            .extends("LParent;")
            .method("a", &[], "V"),
        InterfaceDescription::new("LParent;").method("b", &[], "V"),
    ];

    let out = Synthesizer::default().synthesize_batch(&descriptions).unwrap();
    let dex = load(out.into_bytes());
    let order: Vec<&str> = dex
        .class_defs()
        .iter()
        .map(|def| dex.type_descriptor(def.class_idx).unwrap())
        .collect();
    assert_eq!(order, ["LParent;", "LChild;"]);
}

#[test]
fn batch_rejects_cycles() {
    let descriptions = [
        InterfaceDescription::new("LA;").extends("LB;"),
        InterfaceDescription::new("LB;").extends("LA;"),
    ];

    let err = Synthesizer::default()
        .synthesize_batch(&descriptions)
        .unwrap_err();
    assert!(matches!(err, SynthError::Conflict { ref reason, .. } if reason == "cyclic class hierarchy"));
}

#[test]
fn batch_reports_first_failure() {
    let descriptions = [
        calc(),
        InterfaceDescription::new("LBad$Proxy;").method("x", &["Q"], "V"),
    ];

    let err = Synthesizer::default()
        .synthesize_batch(&descriptions)
        .unwrap_err();
    assert!(matches!(err, SynthError::UnsupportedSignature { .. }));
}

#[test]
fn source_file_recorded() {
    let dex = synth(&calc().source_file("Calc.proxy"));

    let def = class(&dex, CALC_PROXY);
    assert_eq!(dex.string(def.source_file_idx).unwrap(), "Calc.proxy");
}
