use bbcbasic::collaborators::TestCollaborators;
use bbcbasic::Interpreter;

fn run(lines: &[&str]) -> Interpreter<TestCollaborators> {
    let mut interp = Interpreter::new(TestCollaborators::new());
    for line in lines {
        interp.program.enter(line).unwrap();
    }
    interp.run().unwrap();
    interp
}

fn output(interp: &Interpreter<TestCollaborators>) -> String {
    String::from_utf8_lossy(&interp.collab.output).into_owned()
}

#[test]
fn for_loop_sum() {
    let interp = run(&["10 S=0 : FOR I=1 TO 100 : S=S+I : NEXT : PRINT S"]);
    assert_eq!(output(&interp), "5050\n");
}

#[test]
fn recursive_factorial() {
    let interp = run(&[
        "10 DEF FNf(N)=IF N<2 THEN 1 ELSE N*FNf(N-1)",
        "20 PRINT FNf(10)",
    ]);
    assert_eq!(output(&interp), "3628800\n");
}

#[test]
fn string_concat_and_substring() {
    let interp = run(&["10 A$=\"hello\"+\" \"+\"world\" : PRINT MID$(A$,7,5)"]);
    assert_eq!(output(&interp), "world\n");
}

#[test]
fn plot_a_line_and_read_it_back() {
    let interp = run(&["10 MODE 1 : GCOL 0,1 : MOVE 0,0 : DRAW 100,0 : PRINT POINT(50,0)"]);
    assert_eq!(output(&interp), "1\n");
}

#[test]
fn xor_self_inverse_rectangle_fill() {
    let interp = run(&[
        "10 MODE 1 : GCOL 3,2 : RECTANGLE FILL 0,0,50,50 : RECTANGLE FILL 0,0,50,50 : PRINT POINT(10,10)",
    ]);
    assert_eq!(output(&interp), "0\n");
}

#[test]
fn error_trap_reports_the_division_by_zero_code() {
    let interp = run(&[
        "10 ON ERROR PRINT \"caught \";ERR : END",
        "20 A=1/0",
    ]);
    assert_eq!(output(&interp), "caught 18\n");
}

#[test]
fn save_then_load_reproduces_identical_output() {
    let mut first = Interpreter::new(TestCollaborators::new());
    first.program.enter("10 S=0 : FOR I=1 TO 10 : S=S+I : NEXT : PRINT S").unwrap();
    first.run().unwrap();
    let listing = first.program.list();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.bas");
    std::fs::write(&path, &listing).unwrap();
    let reloaded = std::fs::read_to_string(&path).unwrap();

    let mut second = Interpreter::new(TestCollaborators::new());
    for line in reloaded.lines() {
        if !line.trim().is_empty() {
            second.program.enter(line).unwrap();
        }
    }
    second.run().unwrap();

    assert_eq!(output(&first), output(&second));
}

#[test]
fn mode_switch_is_idempotent() {
    let mut interp = run(&["10 MODE 1"]);
    let (before_w, before_h, before_n) = (interp.fb.width(), interp.fb.height(), interp.fb.mode.number);
    let before_pixel = interp.fb.get_pixel(0, 0);
    interp.exec_direct("MODE 1").unwrap();
    assert_eq!((before_w, before_h, before_n), (interp.fb.width(), interp.fb.height(), interp.fb.mode.number));
    assert_eq!(before_pixel, interp.fb.get_pixel(0, 0));
}
