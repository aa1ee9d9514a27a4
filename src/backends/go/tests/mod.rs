//! End-to-end tests: resolve, infer atomicity, then lower to Go.

use super::{GoLoweringConfig, lower_algorithm_to_go};
use crate::backends::go::critical_section::LockingStrategy;
use crate::compiler_frontend::compiler_errors::ErrorType;
use crate::compiler_frontend::resolution::resolve_algorithm;
use crate::compiler_frontend::pcal::pcal_nodes::{Algorithm, ResourceKind, Statement};
use crate::compiler_frontend::pcal::tla_expressions::{BinaryOperator, Expression, ExpressionKind};
use crate::compiler_frontend::test_support::{NodeBuilder, algorithm, analyse};

fn compile_with(program: &Algorithm, config: &GoLoweringConfig) -> String {
    let (definitions, analysis) = analyse(program);
    lower_algorithm_to_go(program, &definitions, &analysis.lock_groups, config)
        .expect("Go lowering should succeed")
}

fn compile(program: &Algorithm) -> String {
    compile_with(program, &GoLoweringConfig::default())
}

/// The body of `func name(...)`, without the signature and closing brace.
fn function_body<'a>(go: &'a str, name: &str) -> &'a str {
    let signature = format!("func {name}(");
    let start = go.find(&signature).expect("function should exist");
    let body_start = start + go[start..].find("{\n").expect("opening brace") + 2;
    let body_end = body_start + go[body_start..].find("\n}\n").expect("closing brace") + 1;
    &go[body_start..body_end]
}

fn less_than(b: &mut NodeBuilder, name: &str, value: i64) -> Expression {
    let variable = b.ident(name);
    let value = b.num(value);
    b.binop(BinaryOperator::LessThan, variable, value)
}

#[test]
fn single_writer_program_is_fully_rendered() {
    let mut b = NodeBuilder::new();
    let x = b.counter("x");
    let target = b.ident("x");
    let one = b.num(1);
    let write = b.assign(target, one);
    let l0 = b.label("L0", vec![write]);
    let process = b.process("P", 1, Vec::new(), vec![l0]);
    let program = algorithm("One", vec![x], Vec::new(), vec![process]);

    let expected = "// Code generated by pgo from algorithm One. DO NOT EDIT.\n\
        \n\
        package main\n\
        \n\
        import (\n\
        \t\"sync\"\n\
        )\n\
        \n\
        var x = 0\n\
        \n\
        var pgoLocks [1]sync.Mutex\n\
        \n\
        func P(self int) {\n\
        \tpgoLocks[0].Lock()\n\
        \tx = 1\n\
        \tpgoLocks[0].Unlock()\n\
        }\n\
        \n\
        func main() {\n\
        \tvar wg sync.WaitGroup\n\
        \twg.Add(1)\n\
        \tgo func() {\n\
        \t\tdefer wg.Done()\n\
        \t\tP(1)\n\
        \t}()\n\
        \twg.Wait()\n\
        }\n";

    assert_eq!(compile(&program), expected);
}

#[test]
fn racing_processes_take_the_same_lock() {
    let mut b = NodeBuilder::new();
    let counter = b.counter("counter");
    let bump = b.increment("counter", 1);
    let inc = b.label("inc", vec![bump]);
    let first = b.process("A", 1, Vec::new(), vec![inc]);
    let bump = b.increment("counter", 1);
    let inc = b.label("inc", vec![bump]);
    let second = b.process("B", 2, Vec::new(), vec![inc]);
    let program = algorithm("Counter", vec![counter], Vec::new(), vec![first, second]);

    let go = compile(&program);
    let expected_body = "\tpgoLocks[0].Lock()\n\
        \tcounter = (counter + 1)\n\
        \tpgoLocks[0].Unlock()\n";
    assert_eq!(function_body(&go, "A"), expected_body);
    assert_eq!(function_body(&go, "B"), expected_body);
    assert!(go.contains("var pgoLocks [1]sync.Mutex"));
}

#[test]
fn both_branches_of_an_if_stay_in_the_label_group() {
    let mut b = NodeBuilder::new();
    let x = b.counter("x");
    let y = b.counter("y");
    let condition = less_than(&mut b, "x", 5);
    let target = b.ident("x");
    let one = b.num(1);
    let write_x = b.assign(target, one);
    let target = b.ident("y");
    let two = b.num(2);
    let write_y = b.assign(target, two);
    let branch = b.if_else(condition, vec![write_x], vec![write_y]);
    let l1 = b.label("L1", vec![branch]);
    let process = b.process("P", 1, Vec::new(), vec![l1]);
    let program = algorithm("Branches", vec![x, y], Vec::new(), vec![process]);

    let go = compile(&program);
    assert_eq!(
        function_body(&go, "P"),
        "\tpgoLocks[0].Lock()\n\
        \tif (x < 5) {\n\
        \t\tx = 1\n\
        \t} else {\n\
        \t\ty = 2\n\
        \t}\n\
        \tpgoLocks[0].Unlock()\n"
    );
}

#[test]
fn loops_reacquire_the_condition_lock_each_iteration() {
    let mut b = NodeBuilder::new();
    let x = b.counter("x");
    let y = b.counter("y");

    // x is only read, so the loop label and the body label end up in different groups
    let condition = less_than(&mut b, "x", 3);
    let target = b.ident("y");
    let one = b.num(1);
    let write = b.assign(target, one);
    let body = b.label("body", vec![write]);
    let while_loop = b.while_loop(condition, vec![body]);
    let head = b.label("head", vec![while_loop]);
    let process = b.process("P", 1, Vec::new(), vec![head]);
    let program = algorithm("Loop", vec![x, y], Vec::new(), vec![process]);

    let go = compile(&program);
    assert_eq!(
        function_body(&go, "P"),
        "\tpgoLocks[0].Lock()\n\
        \tfor {\n\
        \t\tif !(x < 3) {\n\
        \t\t\tbreak\n\
        \t\t}\n\
        \t\tpgoLocks[0].Unlock()\n\
        \t\tpgoLocks[1].Lock()\n\
        \t\ty = 1\n\
        \t\tpgoLocks[1].Unlock()\n\
        \t\tpgoLocks[0].Lock()\n\
        \t}\n\
        \tpgoLocks[0].Unlock()\n"
    );
}

#[test]
fn unsatisfied_await_releases_and_retries_the_step() {
    let mut b = NodeBuilder::new();
    let ready = b.counter("ready");
    let flag = less_than(&mut b, "ready", 1);
    let not_ready = b.not(flag);
    let wait = b.await_(not_ready);
    let target = b.ident("ready");
    let zero = b.num(0);
    let consume = b.assign(target, zero);
    let take = b.label("take", vec![wait, consume]);
    let process = b.process("Consumer", 1, Vec::new(), vec![take]);
    let program = algorithm("Await", vec![ready], Vec::new(), vec![process]);

    let go = compile(&program);
    assert_eq!(
        function_body(&go, "Consumer"),
        "take:\n\
        \tpgoLocks[0].Lock()\n\
        \tif !!(ready < 1) {\n\
        \t\tpgoLocks[0].Unlock()\n\
        \t\tgoto take\n\
        \t}\n\
        \tready = 0\n\
        \tpgoLocks[0].Unlock()\n"
    );
}

#[test]
fn labels_without_globals_take_no_locks() {
    let mut b = NodeBuilder::new();
    let local = b.variable("n", None);
    let target = b.ident("n");
    let me = b.ident("self");
    let write = b.assign(target, me);
    let own = b.label("own", vec![write]);
    let process = b.process("P", 7, vec![local], vec![own]);
    let program = algorithm("Private", Vec::new(), Vec::new(), vec![process]);

    let go = compile(&program);
    assert!(!go.contains("pgoLocks"));
    assert_eq!(
        function_body(&go, "P"),
        "\tvar n int\n\
        \t_ = n\n\
        \tn = self\n"
    );
}

#[test]
fn coordinated_locking_goes_through_the_state_service() {
    let mut b = NodeBuilder::new();
    let x = b.counter("x");
    let bump = b.increment("x", 1);
    let step = b.label("step", vec![bump]);
    let process = b.process_set("Worker", 1, 3, vec![step]);
    let program = algorithm("Distributed", vec![x], Vec::new(), vec![process]);

    let config = GoLoweringConfig {
        locking: LockingStrategy::Coordinated,
        endpoints: vec![String::from("10.0.0.1:2379"), String::from("10.0.0.2:2379")],
        timeout: 5,
        ..GoLoweringConfig::default()
    };
    let go = compile_with(&program, &config);

    assert!(go.contains("\t\"pgonet\"\n"));
    assert!(go.contains("var pgoGlobalState *pgonet.GlobalState\n"));
    assert!(!go.contains("pgoLocks"));
    assert!(go.contains("Endpoints: []string{\"10.0.0.1:2379\", \"10.0.0.2:2379\"},"));
    assert!(go.contains("Timeout:   5,"));
    assert!(go.contains("pgoGlobalState, err = pgonet.InitGlobals(cfg)"));
    assert!(go.contains("\tfor i := 1; i <= 3; i++ {\n"));

    // x lives in the state service, so there is no package-level copy of it
    assert!(!go.contains("var x = 0"));
    assert!(go.contains(
        "\tif err := pgoGlobalState.Set(\"x\", 0); err != nil {\n\t\tpanic(err)\n\t}\n"
    ));

    assert_eq!(
        function_body(&go, "Worker"),
        "\tvar x int\n\
        \t_ = x\n\
        \tif err := pgoGlobalState.Lock(self, 0); err != nil {\n\
        \t\tpanic(err)\n\
        \t}\n\
        \tif pgoValue, err := pgoGlobalState.GetInt(\"x\"); err != nil {\n\
        \t\tpanic(err)\n\
        \t} else {\n\
        \t\tx = pgoValue\n\
        \t}\n\
        \tx = (x + 1)\n\
        \tif err := pgoGlobalState.Set(\"x\", x); err != nil {\n\
        \t\tpanic(err)\n\
        \t}\n\
        \tif err := pgoGlobalState.Unlock(self, 0); err != nil {\n\
        \t\tpanic(err)\n\
        \t}\n"
    );
}

#[test]
fn coordinated_locking_rejects_slice_globals() {
    let mut b = NodeBuilder::new();
    let queue = b.variable_of("queue", None, ResourceKind::Slice);
    let skip = b.skip();
    let step = b.label("step", vec![skip]);
    let process = b.process("P", 1, Vec::new(), vec![step]);
    let program = algorithm("Queue", vec![queue], Vec::new(), vec![process]);

    let (definitions, analysis) = analyse(&program);
    let config = GoLoweringConfig {
        locking: LockingStrategy::Coordinated,
        ..GoLoweringConfig::default()
    };
    let error = lower_algorithm_to_go(&program, &definitions, &analysis.lock_groups, &config)
        .expect_err("slices can't live in the state service");
    assert_eq!(error.error_type, ErrorType::Rule);
}

#[test]
fn procedures_release_before_calls_and_returns() {
    let mut b = NodeBuilder::new();
    let total = b.counter("total");

    let amount = b.variable("amount", None);
    let target = b.ident("total");
    let current = b.ident("total");
    let added = b.ident("amount");
    let sum = b.binop(BinaryOperator::Add, current, added);
    let write = b.assign(target, sum);
    let ret = b.ret();
    let add = b.label("add", vec![write, ret]);
    let procedure = b.procedure("Add", vec![amount], Vec::new(), vec![add]);

    let two = b.num(2);
    let call = b.call("Add", vec![two]);
    let finish = b.goto("Done");
    let total_read = b.ident("total");
    let print = b.print(total_read);
    let start = b.label("start", vec![print, call]);
    let end = b.label("end", vec![finish]);
    let process = b.process("P", 1, Vec::new(), vec![start, end]);
    let program = algorithm("Calls", vec![total], vec![procedure], vec![process]);

    let go = compile(&program);
    assert!(go.contains("\t\"fmt\"\n"));
    assert!(go.contains("func Add(self int, amount int) {\n"));
    assert_eq!(
        function_body(&go, "Add"),
        "\tpgoLocks[0].Lock()\n\
        \ttotal = (total + amount)\n\
        \tpgoLocks[0].Unlock()\n\
        \treturn\n"
    );
    assert_eq!(
        function_body(&go, "P"),
        "\tpgoLocks[0].Lock()\n\
        \tfmt.Println(total)\n\
        \tpgoLocks[0].Unlock()\n\
        \tAdd(self, 2)\n\
        \treturn\n"
    );
}

#[test]
fn either_picks_a_random_branch() {
    let mut b = NodeBuilder::new();
    let x = b.counter("x");
    let left = b.increment("x", 1);
    let right = b.increment("x", -1);
    let choice = b.either(vec![vec![left], vec![right]]);
    let step = b.label("step", vec![choice]);
    let process = b.process("P", 1, Vec::new(), vec![step]);
    let program = algorithm("Choice", vec![x], Vec::new(), vec![process]);

    let go = compile(&program);
    assert!(go.contains("\t\"math/rand\"\n"));
    assert_eq!(
        function_body(&go, "P"),
        "\tpgoLocks[0].Lock()\n\
        \tswitch rand.Intn(2) {\n\
        \tcase 0:\n\
        \t\tx = (x + 1)\n\
        \tcase 1:\n\
        \t\tx = (x + -1)\n\
        \t}\n\
        \tpgoLocks[0].Unlock()\n"
    );
}

#[test]
fn branches_that_jump_close_their_section() {
    let mut b = NodeBuilder::new();
    let x = b.counter("x");
    let condition = less_than(&mut b, "x", 10);
    let bump = b.increment("x", 1);
    let again = b.goto("check");
    let branch = b.if_else(condition, vec![bump, again], Vec::new());
    let check = b.label("check", vec![branch]);
    let skip = b.skip();
    let after = b.label("after", vec![skip]);
    let process = b.process("P", 1, Vec::new(), vec![check, after]);
    let program = algorithm("Jump", vec![x], Vec::new(), vec![process]);

    let go = compile(&program);
    assert_eq!(
        function_body(&go, "P"),
        "check:\n\
        \tpgoLocks[0].Lock()\n\
        \tif (x < 10) {\n\
        \t\tx = (x + 1)\n\
        \t\tpgoLocks[0].Unlock()\n\
        \t\tgoto check\n\
        \t} else {\n\
        \t\tpgoLocks[0].Unlock()\n\
        \t}\n"
    );
}

#[test]
fn simultaneous_assignment_reads_old_values_and_slices_are_one_based() {
    let mut b = NodeBuilder::new();
    let one = b.num(1);
    let two = b.num(2);
    let tuple = b.expression(
        ExpressionKind::Tuple(vec![one, two]),
    );
    let pair = b.variable_of("pair", Some(tuple), ResourceKind::Slice);

    let first_index = b.num(1);
    let first = b.index("pair", vec![first_index]);
    let second_index = b.num(2);
    let second = b.index("pair", vec![second_index]);
    let first_read_index = b.num(1);
    let first_read = b.index("pair", vec![first_read_index]);
    let second_read_index = b.num(2);
    let second_read = b.index("pair", vec![second_read_index]);
    let swap = b.assign_pairs(vec![(first, second_read), (second, first_read)]);
    let step = b.label("swap", vec![swap]);
    let process = b.process("P", 1, Vec::new(), vec![step]);
    let program = algorithm("Swap", vec![pair], Vec::new(), vec![process]);

    let go = compile(&program);
    assert!(go.contains("var pair = []int{1, 2}\n"));
    assert_eq!(
        function_body(&go, "P"),
        "\tpgoLocks[0].Lock()\n\
        \t{\n\
        \t\tpgoTmp0 := pair[2-1]\n\
        \t\tpgoTmp1 := pair[1-1]\n\
        \t\tpair[1-1] = pgoTmp0\n\
        \t\tpair[2-1] = pgoTmp1\n\
        \t}\n\
        \tpgoLocks[0].Unlock()\n"
    );
}

/// `L1: if x < 5 then goto L2 end if; x := 1; L2: x := 2`, racing a second writer of x.
fn skip_ahead_program(label_the_fallthrough: bool) -> Algorithm {
    let mut b = NodeBuilder::new();
    let x = b.counter("x");

    let condition = less_than(&mut b, "x", 5);
    let jump = b.goto("L2");
    let skip = b.skip();
    let branch = b.if_else(condition, vec![jump], vec![skip]);
    let target = b.ident("x");
    let one = b.num(1);
    let fallthrough = b.assign(target, one);
    let target = b.ident("x");
    let two = b.num(2);
    let skipped_to = b.assign(target, two);
    let second = b.label("L2", vec![skipped_to]);

    let body = if label_the_fallthrough {
        let first = b.label("L1", vec![branch]);
        let middle = b.label("L1b", vec![fallthrough]);
        vec![first, middle, second]
    } else {
        let first = b.label("L1", vec![branch, fallthrough]);
        vec![first, second]
    };
    let process = b.process("P", 1, Vec::new(), body);

    let target = b.ident("x");
    let three = b.num(3);
    let write = b.assign(target, three);
    let other = b.label("w", vec![write]);
    let writer = b.process("Q", 2, Vec::new(), vec![other]);

    algorithm("SkipAhead", vec![x], Vec::new(), vec![process, writer])
}

#[test]
fn code_after_a_jump_never_runs_outside_a_section() {
    let unlabeled = skip_ahead_program(false);
    let error = resolve_algorithm(&unlabeled).expect_err("x := 1 has no label");
    assert_eq!(error.error_type, ErrorType::Rule);

    let go = compile(&skip_ahead_program(true));
    assert_eq!(
        function_body(&go, "P"),
        "\tpgoLocks[0].Lock()\n\
        \tif (x < 5) {\n\
        \t\tpgoLocks[0].Unlock()\n\
        \t\tgoto L2\n\
        \t} else {\n\
        \t\tpgoLocks[0].Unlock()\n\
        \t}\n\
        \tpgoLocks[0].Lock()\n\
        \tx = 1\n\
        \tpgoLocks[0].Unlock()\n\
        L2:\n\
        \tpgoLocks[0].Lock()\n\
        \tx = 2\n\
        \tpgoLocks[0].Unlock()\n"
    );
    assert_sections_balanced(function_body(&go, "P"));
}

struct OpenBlock {
    opener: String,
    entry: u32,
    arm_exits: Vec<u32>,
    has_else: bool,
}

/// Walks the rendered body and checks that every path pairs each `Lock` with an
/// `Unlock`, and that no jump, return or jump target is reached holding a lock.
fn assert_sections_balanced(body: &str) {
    let mut held = 0;
    let mut reachable = true;
    let mut blocks: Vec<OpenBlock> = Vec::new();

    for line in body.lines().map(str::trim) {
        if line.ends_with(".Lock()") {
            assert_eq!(held, 0, "Lock while holding a lock in:\n{body}");
            held = 1;
        } else if line.ends_with(".Unlock()") {
            assert_eq!(held, 1, "Unlock without a Lock in:\n{body}");
            held = 0;
        } else if line.starts_with("goto ") || line == "return" {
            assert_eq!(held, 0, "'{line}' while holding a lock in:\n{body}");
            reachable = false;
        } else if line == "break" {
            reachable = false;
        } else if line.starts_with("case ") {
            let block = blocks.last_mut().expect("case inside a switch");
            if line != "case 0:" && reachable {
                block.arm_exits.push(held);
            }
            held = block.entry;
            reachable = true;
        } else if line == "} else {" {
            let block = blocks.last_mut().expect("else inside an if");
            if reachable {
                block.arm_exits.push(held);
            }
            block.has_else = true;
            held = block.entry;
            reachable = true;
        } else if line.ends_with('{') {
            blocks.push(OpenBlock {
                opener: line.to_owned(),
                entry: held,
                arm_exits: Vec::new(),
                has_else: false,
            });
        } else if line == "}" {
            let mut block = blocks.pop().expect("balanced braces");
            if reachable {
                block.arm_exits.push(held);
            }
            if block.opener == "for {" {
                assert!(
                    block.arm_exits.iter().all(|exit| *exit == block.entry),
                    "loop body changes what is held in:\n{body}"
                );
                held = block.entry;
                reachable = true;
                continue;
            }
            if block.opener.starts_with("if ") && !block.has_else {
                block.arm_exits.push(block.entry);
            }
            assert!(
                block.arm_exits.windows(2).all(|pair| pair[0] == pair[1]),
                "branches disagree on what is held in:\n{body}"
            );
            reachable = !block.arm_exits.is_empty();
            held = block.arm_exits.first().copied().unwrap_or(0);
        } else if line.ends_with(':') || line.ends_with(": {}") {
            assert_eq!(held, 0, "jump target '{line}' reached holding a lock in:\n{body}");
            held = 0;
            reachable = true;
        }
    }

    assert!(blocks.is_empty());
    assert_eq!(held, 0, "body ends holding a lock:\n{body}");
}

#[test]
fn every_path_releases_what_it_acquires() {
    type Case = fn(&mut NodeBuilder) -> Vec<Statement>;

    let cases: [(&str, Case); 4] = [
        ("branch", |b| {
            let condition = less_than(b, "x", 5);
            let bump = b.increment("x", 1);
            let drop = b.increment("x", -1);
            let branch = b.if_else(condition, vec![bump], vec![drop]);
            vec![b.label("step", vec![branch])]
        }),
        ("await", |b| {
            let condition = less_than(b, "x", 5);
            let wait = b.await_(condition);
            let bump = b.increment("x", 1);
            vec![b.label("step", vec![wait, bump])]
        }),
        ("loop", |b| {
            let condition = less_than(b, "x", 5);
            let bump = b.increment("x", 1);
            let body = b.label("body", vec![bump]);
            let while_loop = b.while_loop(condition, vec![body]);
            vec![b.label("head", vec![while_loop])]
        }),
        ("jump", |b| {
            let condition = less_than(b, "x", 5);
            let again = b.goto("L1");
            let skip = b.skip();
            let branch = b.if_else(condition, vec![again], vec![skip]);
            let first = b.label("L1", vec![branch]);
            let bump = b.increment("x", 1);
            let jump = b.goto("L3");
            let second = b.label("L2", vec![bump, jump]);
            let drop = b.increment("x", -1);
            let third = b.label("L3", vec![drop]);
            vec![first, second, third]
        }),
    ];

    for (name, build) in cases {
        let mut b = NodeBuilder::new();
        let x = b.counter("x");
        let body = build(&mut b);
        let process = b.process("P", 1, Vec::new(), body);
        let bump = b.increment("x", 1);
        let other = b.label("other", vec![bump]);
        let writer = b.process("Q", 2, Vec::new(), vec![other]);
        let program = algorithm(name, vec![x], Vec::new(), vec![process, writer]);

        let go = compile(&program);
        assert_sections_balanced(function_body(&go, "P"));
        assert_sections_balanced(function_body(&go, "Q"));
    }
}
