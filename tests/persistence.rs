// tests/persistence.rs
use glam::IVec2;
use gridbot::{
    Condition, ConditionKind, DecodeError, Intrinsic, Map, Module, ProcId, ProcIdent, RobotId,
    StepOutcome, StmtKind, Tile, TileMap, Workspace,
};

fn ident(s: &str) -> ProcIdent {
    ProcIdent::new(s).unwrap()
}

fn append(module: &mut Module, proc: ProcId, kind: StmtKind) {
    let body = module.proc(proc).unwrap().body();
    module.append_stmt(body, kind).unwrap();
}

/// A program touching every statement kind, with calls to procedures defined
/// later in the module.
fn setup() -> (Workspace, RobotId) {
    let mut module = Module::seeded(11);
    let main = module.append_proc(ident("MAINPROC")).unwrap();
    let stepper = module.append_proc(ident("STEPPER1")).unwrap();
    let last = module.append_proc(ident("LASTPROC")).unwrap();

    let turn = StmtKind::intrinsic(Intrinsic::TurnLeft);
    let loop_body = module.create_block();
    module.append_stmt(loop_body, StmtKind::call(stepper)).unwrap();
    for _ in 0..4 {
        module.append_stmt(loop_body, turn).unwrap();
    }
    append(&mut module, main, StmtKind::repeat(3, None, loop_body, None));

    let pick = module.create_block();
    module
        .append_stmt(pick, StmtKind::intrinsic(Intrinsic::PickUp))
        .unwrap();
    let grey = module.create_block();
    module
        .append_stmt(grey, StmtKind::intrinsic(Intrinsic::PutGrey))
        .unwrap();
    append(
        &mut module,
        main,
        StmtKind::if_else(Condition::is(ConditionKind::AnyTag), pick, grey),
    );
    append(&mut module, main, StmtKind::call(last));

    append(&mut module, stepper, StmtKind::intrinsic(Intrinsic::Move));
    append(&mut module, stepper, StmtKind::intrinsic(Intrinsic::PutWhite));

    let walk = module.create_block();
    module
        .append_stmt(walk, StmtKind::intrinsic(Intrinsic::Move))
        .unwrap();
    append(
        &mut module,
        last,
        StmtKind::repeat(0, Some(Condition::not(ConditionKind::Wall)), walk, None),
    );
    append(&mut module, last, StmtKind::intrinsic(Intrinsic::PutBlack));

    let mut ws = Workspace::new(module, TileMap::new(8, 3));
    let id = ws.robots.add(IVec2::new(0, 1)).unwrap();
    ws.run_proc(id, main).unwrap();
    (ws, id)
}

fn save(ws: &Workspace) -> String {
    let mut out = Vec::new();
    ws.save(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn only_robot(ws: &Workspace) -> RobotId {
    ws.robots.iter().next().unwrap().0
}

#[test]
fn test_reference_run_reaches_the_far_wall() {
    let (mut ws, id) = setup();
    assert_eq!(ws.run(id, 1000), Ok(StepOutcome::Idle));

    let robot = ws.robots.get(id).unwrap();
    assert_eq!(robot.position(), IVec2::new(7, 1));
    let map = ws.robots.map();
    assert_eq!(map.tile(IVec2::new(1, 1)), Tile::WhiteTag);
    assert_eq!(map.tile(IVec2::new(2, 1)), Tile::WhiteTag);
    assert_eq!(map.tile(IVec2::new(3, 1)), Tile::Empty, "Picked up");
    assert_eq!(map.tile(IVec2::new(7, 1)), Tile::BlackTag);
}

#[test]
fn test_save_and_resume_after_every_step() {
    let (reference, _) = setup();
    let mut finished = reference.clone();
    let id = only_robot(&finished);
    let mut total = 0;
    while finished.step(id).unwrap() == StepOutcome::Running {
        total += 1;
    }
    let expected = save(&finished);

    let mut saw_loop_back = false;
    let mut saw_nested = false;
    for k in 0..=total {
        let mut ws = reference.clone();
        let id = only_robot(&ws);
        for _ in 0..k {
            ws.step(id).unwrap();
        }
        let text = save(&ws);
        saw_loop_back |= text.contains(" L ");
        saw_nested |= ws.robots.get(id).unwrap().stack().depth() > 1;

        let mut loaded = Workspace::load(text.as_bytes()).unwrap();
        assert_eq!(save(&loaded), text, "Re-saving after {k} steps");

        let id = only_robot(&loaded);
        assert_eq!(loaded.run(id, 1000), Ok(StepOutcome::Idle), "Resumed after {k} steps");
        assert_eq!(save(&loaded), expected, "Terminal state after {k} steps");
    }
    assert!(saw_loop_back);
    assert!(saw_nested);
}

#[test]
fn test_module_round_trip_keeps_structure() {
    let (ws, _) = setup();
    let mut out = Vec::new();
    ws.module.save(&mut out).unwrap();

    let loaded = Module::load(out.as_slice()).unwrap();
    let idents: Vec<_> = loaded.procs().map(|(_, p)| p.ident().to_string()).collect();
    assert_eq!(idents, ["MAINPROC", "STEPPER1", "LASTPROC"]);

    let kinds = |module: &Module, p: ProcId| -> Vec<u32> {
        module
            .preorder(p)
            .unwrap()
            .into_iter()
            .map(|s| module.stmt(s).unwrap().kind().type_code())
            .collect()
    };
    for (id, proc) in ws.module.procs() {
        let other = loaded.find_proc(proc.ident()).unwrap();
        assert_eq!(kinds(&ws.module, id), kinds(&loaded, other));
    }

    let main = loaded.find_proc(&ident("MAINPROC")).unwrap();
    let last = loaded.find_proc(&ident("LASTPROC")).unwrap();
    let first = loaded.preorder(main).unwrap();
    let tail_call = loaded.stmt(*first.last().unwrap()).unwrap();
    assert_eq!(*tail_call.kind(), StmtKind::call(last));

    let mut again = Vec::new();
    loaded.save(&mut again).unwrap();
    assert_eq!(again, out);
}

#[test]
fn test_unresolved_call_fails_the_load() {
    let text = "2\nMAINPROC\n1\n1 OTHERPRC\nSECONDPR\n0\n";
    let err = Module::load(text.as_bytes()).unwrap_err();
    match err {
        DecodeError::UnresolvedProc { line, ident } => {
            assert_eq!(line, 4);
            assert_eq!(ident.as_str(), "OTHERPRC");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_duplicate_procedure_fails_the_load() {
    let text = "2\nMAINPROC\n0\nMAINPROC\n0\n";
    let err = Module::load(text.as_bytes()).unwrap_err();
    assert!(matches!(err, DecodeError::DuplicateProc { line: 4, .. }));
}

#[test]
fn test_stopped_robot_keeps_error_and_cursor() {
    let mut module = Module::seeded(3);
    let main = module.append_proc(ident("BUMPWALL")).unwrap();
    append(&mut module, main, StmtKind::intrinsic(Intrinsic::Move));
    append(&mut module, main, StmtKind::intrinsic(Intrinsic::Move));

    let mut ws = Workspace::new(module, TileMap::from_rows(&["..#"]));
    let id = ws.robots.add(IVec2::ZERO).unwrap();
    ws.run_proc(id, main).unwrap();
    assert_eq!(ws.step(id), Ok(StepOutcome::Running));
    assert!(matches!(ws.step(id), Ok(StepOutcome::Stopped(_))));

    let text = save(&ws);
    let loaded = Workspace::load(text.as_bytes()).unwrap();
    let robot = ws.robots.get(id).unwrap();
    let restored = loaded.robots.get(only_robot(&loaded)).unwrap();
    assert_eq!(restored.error(), robot.error());
    assert_eq!(restored.position(), IVec2::new(1, 0));
    assert!(restored.is_busy());
    assert!(restored.is_stopped());
}

#[test]
fn test_bad_continuations_fail_the_load() {
    let module = "1\nMAINPROC\n1\n0 1\n";
    let map = "1 1\n\n0\n";
    for (robots, line) in [
        ("1\n0 0 0 0\n1\nNOSUCHPR\n0\n0\n", 11),
        ("1\n0 0 0 0\n1\nMAINPROC\n1\n0\n", 12),
        ("1\n0 0 0 0\n0\n1\nMAINPROC\n0 L 2\n", 13),
    ] {
        let text = format!("{module}{map}{robots}");
        let err = Workspace::load(text.as_bytes()).unwrap_err();
        let reported = match err {
            DecodeError::UnresolvedProc { line, .. }
            | DecodeError::BadStmtIndex { line, .. }
            | DecodeError::Malformed { line, .. } => line,
            other => panic!("unexpected error {other}"),
        };
        assert_eq!(reported, line, "{robots:?}");
    }
}
