//! End-to-end tests: IR dumps are compiled and the listings executed.

mod common;

use bumpalo::Bump;
use common::{body_of, compile, run};
use rvback::compiler::{compile_program, CompilerOptions};
use rvback::core::{CompilationSession, CompileError};
use rvback::ir::parse_program;

const STEPS: usize = 200_000;

fn dump(fundefs: &str, body: &str) -> String {
    format!("first_hp : 0\nfundef list:\n[{fundefs}]\nt:\n{body}\n")
}

fn output_of(dump: &str, options: &CompilerOptions) -> String {
    let (listing, _) = compile(dump, options);
    run(&listing, Vec::new(), STEPS).output_text()
}

#[test]
fn test_let_chain_sum_needs_no_spill() {
    let program = dump(
        "{name:(seven.1,Fun([],int)),args:[],formal_fv:[],\
         body:Let((x.2,int),Int(3),Let((y.3,int),Int(4),Add(x.2,y.3)))},",
        "Let((r.4,int),AppDir(seven.1,[]),AppDir(min_caml_print_int,[r.4,]))",
    );
    let (listing, stats) = compile(&program, &CompilerOptions::default());
    assert_eq!(stats.spilled_int, 0);
    assert_eq!(stats.spilled_float, 0);
    let body = body_of(&listing, "seven_1");
    assert!(body.iter().any(|l| l.trim_start().starts_with("add")));
    assert_eq!(run(&listing, Vec::new(), STEPS).output_text(), "007");
}

#[test]
fn test_direct_call_passes_arguments_in_order() {
    let program = dump(
        "{name:(f.1,Fun([int,int],int)),args:[(x.2,int),(y.3,int),],formal_fv:[],body:Sub(x.2,y.3)},",
        "Let((a.4,int),Int(10),Let((b.5,int),Int(4),\
         Let((r.6,int),AppDir(f.1,[a.4,b.5,]),AppDir(min_caml_print_int,[r.6,]))))",
    );
    assert_eq!(output_of(&program, &CompilerOptions::default()), "006");
}

#[test]
fn test_self_tail_call_becomes_jump() {
    let program = dump(
        "{name:(loop.1,Fun([int,int],int)),args:[(n.2,int),(acc.3,int),],formal_fv:[],\
         body:Let((z.4,int),Int(0),IfEq(n.2,z.4,Var(acc.3),\
         Let((o.5,int),Int(1),Let((m.6,int),Sub(n.2,o.5),\
         Let((s.7,int),Add(acc.3,n.2),AppDir(loop.1,[m.6,s.7,]))))))},",
        "Let((n.8,int),Int(5),Let((z.9,int),Int(0),\
         Let((r.10,int),AppDir(loop.1,[n.8,z.9,]),AppDir(min_caml_print_int,[r.10,]))))",
    );
    let (listing, stats) = compile(&program, &CompilerOptions::default());
    let body = body_of(&listing, "loop_1");
    assert!(!body.is_empty());
    assert!(body.iter().any(|l| l.trim() == "j         loop_1"));
    assert!(!body.iter().any(|l| l.trim_start().starts_with("call")));
    assert!(!body.iter().any(|l| l.contains("ra,")));
    assert_eq!(stats.tail_calls, 1);
    assert_eq!(run(&listing, Vec::new(), STEPS).output_text(), "015");
}

#[test]
fn test_closure_reads_free_variable() {
    let program = dump(
        "{name:(adder.1,Fun([int],int)),args:[(x.2,int),],formal_fv:[(k.3,int),],body:Add(x.2,k.3)},",
        "Let((k.4,int),Int(7),\
         MakeCls((add.5,Fun([int],int)),{entry:adder.1,actual_fv:[k.4]},\
         Let((v.6,int),Int(5),\
         Let((r.7,int),AppCls(add.5,[v.6,]),AppDir(min_caml_print_int,[r.7,])))))",
    );
    let (listing, _) = compile(&program, &CompilerOptions::default());
    assert!(body_of(&listing, "main").iter().any(|l| l.contains("jalr")));
    assert_eq!(run(&listing, Vec::new(), STEPS).output_text(), "012");
}

/// Thirty values live at once, summed left to right.
fn pressure_program() -> String {
    let mut body = String::new();
    let mut closing = 0;
    for i in 0..30 {
        body.push_str(&format!("Let((v{i}.{i},int),Int({}),", 10 + i));
        closing += 1;
    }
    body.push_str("Let((s1.101,int),Add(v0.0,v1.1),");
    closing += 1;
    for i in 2..30 {
        body.push_str(&format!(
            "Let((s{i}.{},int),Add(s{}.{},v{i}.{i}),",
            100 + i,
            i - 1,
            100 + i - 1
        ));
        closing += 1;
    }
    body.push_str("AppDir(min_caml_print_int,[s29.129,])");
    body.push_str(&")".repeat(closing));
    dump("", &body)
}

#[test]
fn test_high_pressure_spills_safely() {
    let program = pressure_program();
    let (listing, stats) = compile(&program, &CompilerOptions::default());
    assert!(stats.spilled_int > 0);
    assert!(stats.allocator_rounds > 1);
    assert_eq!(run(&listing, Vec::new(), STEPS).output_text(), "735");
}

#[test]
fn test_optimizer_settings_preserve_behaviour() {
    let program = pressure_program();
    let plain = CompilerOptions {
        opt_rounds: 0,
        vectorize: false,
        schedule_loads: false,
        ..CompilerOptions::default()
    };
    let no_vector = CompilerOptions {
        vectorize: false,
        ..CompilerOptions::default()
    };
    let expected = output_of(&program, &plain);
    assert_eq!(expected, "735");
    assert_eq!(output_of(&program, &no_vector), expected);
    assert_eq!(output_of(&program, &CompilerOptions::default()), expected);
}

/// Thirty ints and thirty floats held across a builtin call, a float builtin call and a
/// compiled call, then summed.
fn values_across_calls_program() -> String {
    let mut body = String::new();
    let mut closing = 0;
    for i in 0..30 {
        body.push_str(&format!("Let((v{i}.{i},int),Int({}),", i + 1));
        body.push_str(&format!("Let((g{i}.{},float),Float({}.),", 50 + i, i + 1));
        closing += 2;
    }
    body.push_str("Let((c.200,int),Int(65),Let((u.201,unit),AppDir(min_caml_print_char,[c.200,]),");
    body.push_str("Let((d.202,int),AppDir(diff.1,[v9.9,v2.2,]),");
    body.push_str("Let((h.203,float),AppDir(min_caml_fsgnj,[g0.50,g1.51,]),");
    closing += 4;
    body.push_str("Let((t1.101,int),Add(v0.0,v1.1),Let((f1.151,float),FAdd(g0.50,g1.51),");
    closing += 2;
    for i in 2..30 {
        body.push_str(&format!(
            "Let((t{i}.{},int),Add(t{}.{},v{i}.{i}),",
            100 + i,
            i - 1,
            100 + i - 1
        ));
        body.push_str(&format!(
            "Let((f{i}.{},float),FAdd(f{}.{},g{i}.{}),",
            150 + i,
            i - 1,
            150 + i - 1,
            50 + i
        ));
        closing += 2;
    }
    body.push_str("Let((t.300,int),Add(t29.129,d.202),Let((f.301,float),FAdd(f29.179,h.203),");
    body.push_str("Let((fi.302,int),AppDir(min_caml_int_of_float,[f.301,]),");
    body.push_str("Let((w.303,unit),AppDir(min_caml_print_int,[t.300,]),");
    body.push_str("AppDir(min_caml_print_int,[fi.302,])");
    closing += 4;
    body.push_str(&")".repeat(closing));
    dump(
        "{name:(diff.1,Fun([int,int],int)),args:[(x.2,int),(y.3,int),],formal_fv:[],body:Sub(x.2,y.3)},",
        &body,
    )
}

#[test]
fn test_values_survive_calls_under_pressure() {
    let program = values_across_calls_program();
    let (listing, stats) = compile(&program, &CompilerOptions::default());
    assert!(stats.spilled_int > 0);
    assert!(body_of(&listing, "main").iter().any(|l| l.contains("call      min_caml_fsgnj")));
    // 1 + .. + 30 = 465; diff gives 7 and fsgnj hands back its second argument
    assert_eq!(run(&listing, Vec::new(), STEPS).output_text(), "A472467");

    let scalar = CompilerOptions {
        vectorize: false,
        schedule_loads: false,
        ..CompilerOptions::default()
    };
    assert_eq!(output_of(&program, &scalar), "A472467");
}

/// Tuples stored and read back around a three-argument call.
fn tuple_program() -> String {
    dump(
        "{name:(sum3.1,Fun([int,int,int],int)),args:[(x.2,int),(y.3,int),(z.4,int),],formal_fv:[],\
         body:Let((s.5,int),Add(x.2,y.3),Add(s.5,z.4))},",
        "Let((a.10,int),Int(3),Let((b.11,int),Int(5),Let((c.12,int),Int(7),Let((e.13,int),Int(11),\
         Let((t.14,Tuple([int,int,int,int])),Tuple([a.10,b.11,c.12,e.13,]),\
         Let((p.15,Tuple([int,int])),Tuple([e.13,a.10,]),\
         Let((r.16,int),AppDir(sum3.1,[a.10,c.12,e.13,]),\
         LetTuple([(w.17,int),(x.18,int),(y.19,int),(z.20,int),],t.14,\
         LetTuple([(m.21,int),(n.22,int),],p.15,\
         Let((s1.23,int),Add(w.17,x.18),Let((s2.24,int),Add(s1.23,y.19),\
         Let((s3.25,int),Add(s2.24,z.20),Let((q.26,int),Add(s3.25,r.16),\
         Let((q2.27,int),Add(q.26,m.21),AppDir(min_caml_print_int,[q2.27,])))))))))))))))",
    )
}

#[test]
fn test_vector_accesses_match_scalar_code() {
    let program = tuple_program();
    let scalar = CompilerOptions {
        vectorize: false,
        ..CompilerOptions::default()
    };
    let (plain, plain_stats) = compile(&program, &scalar);
    let (vector, vector_stats) = compile(&program, &CompilerOptions::default());
    assert_eq!(plain_stats.vector_ops, 0);
    assert!(vector_stats.vector_ops > 0);
    assert!(!plain.contains("\tvsw") && !plain.contains("\tvlw"));
    assert!(vector.contains("\tvsw"));

    let expected_heap = vec![
        (0x1000, 3),
        (0x1004, 5),
        (0x1008, 7),
        (0x100c, 11),
        (0x1010, 11),
        (0x1014, 3),
    ];
    let plain_run = run(&plain, Vec::new(), STEPS);
    let vector_run = run(&vector, Vec::new(), STEPS);
    assert_eq!(plain_run.output_text(), "058");
    assert_eq!(vector_run.output_text(), "058");
    assert_eq!(plain_run.heap(), expected_heap);
    assert_eq!(vector_run.heap(), expected_heap);
}

#[test]
fn test_listing_layout() {
    let program = dump("", "Let((c.1,int),Int(65),AppDir(min_caml_print_char,[c.1,]))");
    let (listing, stats) = compile(&program, &CompilerOptions::default());
    assert!(listing.starts_with(".globl main\n\n.text\n\n"));
    assert!(listing.contains("\nmin_caml_print_int:\n"));
    assert!(listing.contains("\nmain:\n"));
    assert!(listing.ends_with("\n\tebreak\n"));
    assert_eq!(stats.functions_compiled, 1);
    assert_eq!(run(&listing, Vec::new(), STEPS).output_text(), "A");
}

#[test]
fn test_read_int_round_trips_through_port() {
    let program = dump(
        "",
        "Let((u.1,unit),Unit,Let((n.2,int),AppDir(min_caml_read_int,[u.1,]),\
         AppDir(min_caml_print_int,[n.2,])))",
    );
    let (listing, _) = compile(&program, &CompilerOptions::default());
    let machine = run(&listing, vec![0, 0, 0, 42], STEPS);
    assert_eq!(machine.output_text(), "042");
}

#[test]
fn test_undefined_variable_is_reported() {
    common::init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let program = parse_program(&dump("", "AppDir(min_caml_print_int,[q.9,])")).unwrap();
    let err = compile_program(&program, &CompilerOptions::default(), &session).unwrap_err();
    match err {
        CompileError::UndefinedVariable { name, context } => {
            assert_eq!(name, "q.9");
            assert_eq!(context, "main");
        }
        other => panic!("unexpected error {other:?}"),
    }
}
