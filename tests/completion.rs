//! End-to-end completion scenarios on filesystem fixtures: a temp lib-path
//! directory holding textual package archives, a temp source directory for
//! the edited buffer and its siblings. The cursor is marked with `@` in the
//! buffer text.

use std::fs;

use gocaret::{Candidate, Completion, Config, DeclKind, Session};

const FMT_ARCHIVE: &[u8] = b"\nimport\n$$\npackage fmt\n\
\tfunc @\"\".Println (a ...interface { }) (n int, err error)\n\
\tfunc @\"\".Printf (format string, a ...interface { }) (n int, err error)\n\
\tfunc @\"\".Sprintf (format string, a ...interface { }) string\n\
\ttype @\"\".Stringer interface { String () string }\n\
\tvar @\"\".ErrFormat error\n\
\tfunc @\"\".internal () int\n\
\n$$\n";

struct Fixture {
    _lib: tempfile::TempDir,
    src: tempfile::TempDir,
    session: Session,
}

fn fixture() -> Fixture {
    fixture_with(Config::default())
}

fn fixture_with(mut config: Config) -> Fixture {
    let lib = tempfile::tempdir().unwrap();
    fs::write(lib.path().join("fmt.a"), FMT_ARCHIVE).unwrap();
    let src = tempfile::tempdir().unwrap();
    config.lib_path = lib.path().display().to_string();
    Fixture {
        session: Session::new(config),
        _lib: lib,
        src,
    }
}

fn complete(fx: &mut Fixture, marked: &str) -> Completion {
    let cursor = marked.find('@').expect("cursor marker") as u32;
    let buffer = marked.replace('@', "");
    let path = fx.src.path().join("main.go");
    fx.session.complete(&buffer, &path, cursor)
}

fn names(c: &Completion) -> Vec<&str> {
    c.candidates.iter().map(|x| x.name.as_str()).collect()
}

fn get<'a>(c: &'a Completion, name: &str) -> &'a Candidate {
    c.candidates
        .iter()
        .find(|x| x.name == name)
        .unwrap_or_else(|| panic!("no candidate named {name:?} in {:?}", names(c)))
}

fn assert_sorted(c: &Completion) {
    let keys: Vec<_> = c
        .candidates
        .iter()
        .map(|x| (x.class, x.name.clone()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "candidates out of order");
}

#[test]
fn package_members_after_dot() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.@\n}\n",
    );

    assert_eq!(get(&c, "Println").class, DeclKind::Func);
    assert_eq!(get(&c, "Printf").class, DeclKind::Func);
    assert_eq!(get(&c, "ErrFormat").typ, "error");
    assert_eq!(get(&c, "Stringer").class, DeclKind::Type);
    // Unexported names never leave the archive.
    assert!(!names(&c).contains(&"internal"));
    // func sorts before var.
    let println_at = names(&c).iter().position(|n| *n == "Println").unwrap();
    let err_at = names(&c).iter().position(|n| *n == "ErrFormat").unwrap();
    assert!(println_at < err_at);
    assert_sorted(&c);
    assert_eq!(c.partial_len, 0);
}

#[test]
fn method_set_through_embedding() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\n\
         type B struct{}\n\n\
         func (b *B) Run() {}\n\n\
         type A struct {\n\t*B\n\tName string\n}\n\n\
         func main() {\n\tvar a A\n\ta.@\n}\n",
    );
    assert_eq!(get(&c, "Name").typ, "string");
    assert_eq!(get(&c, "Run").class, DeclKind::Func);
    // The embedded field itself is addressable too.
    assert_eq!(get(&c, "B").typ, "*B");
}

#[test]
fn embedded_name_is_shadowed_by_outer_field() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\n\
         type B struct{}\n\n\
         func (b *B) Run() {}\n\n\
         type A struct {\n\t*B\n\tRun int\n}\n\n\
         func main() {\n\tvar a A\n\ta.@\n}\n",
    );
    let run = get(&c, "Run");
    assert_eq!(run.class, DeclKind::Var);
    assert_eq!(run.typ, "int");
    assert_eq!(names(&c).iter().filter(|n| **n == "Run").count(), 1);
}

#[test]
fn multi_value_short_declaration() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\nfunc main() {\n\
         \tm := map[string]int{}\n\
         \tx, ok := m[\"k\"]\n\
         \t@\n}\n",
    );
    assert_eq!(get(&c, "x").typ, "int");
    assert_eq!(get(&c, "ok").typ, "bool");
    assert_eq!(get(&c, "m").typ, "map[string]int");
}

#[test]
fn range_over_map_value_completes() {
    let mut fx = fixture();
    let src = "package main\n\n\
               type S struct{ F int }\n\n\
               func main() {\n\
               \tm := map[string]S{}\n\
               \tfor k, v := range m {\n\t\tv.@\n\t}\n}\n";
    let c = complete(&mut fx, src);
    assert_eq!(get(&c, "F").typ, "int");

    // The string-typed key offers nothing.
    let c = complete(&mut fx, &src.replace("v.@", "k.@"));
    assert!(c.candidates.is_empty());
}

#[test]
fn partial_identifier_filters_and_reports_length() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Pr@\n}\n",
    );
    assert_eq!(c.partial_len, 2);
    assert!(!c.candidates.is_empty());
    assert!(c.candidates.iter().all(|x| x.name.starts_with("Pr")));
    assert!(names(&c).contains(&"Println"));
    assert!(!names(&c).contains(&"Sprintf"));
}

#[test]
fn class_filter_keyword() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\n\
         type S struct{}\n\n\
         var V int\n\n\
         func F() {}\n\n\
         type @",
    );
    assert!(names(&c).contains(&"S"));
    assert!(c.candidates.iter().all(|x| x.class == DeclKind::Type));
}

#[test]
fn ignore_case_fallback() {
    let mut config = Config::default();
    config.ignore_case = true;
    let mut fx = fixture_with(config);
    let c = complete(
        &mut fx,
        "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.pr@\n}\n",
    );
    assert_eq!(c.partial_len, 2);
    assert!(names(&c).contains(&"Println"));
    assert!(names(&c).contains(&"Printf"));
}

#[test]
fn struct_literal_offers_fields_only() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\n\
         type S struct {\n\tX int\n\tY string\n}\n\n\
         func (s S) Method() {}\n\n\
         func main() {\n\tt := S{@\n}\n",
    );
    assert_eq!(get(&c, "X").typ, "int");
    assert_eq!(get(&c, "Y").typ, "string");
    assert!(!names(&c).contains(&"Method"));
}

#[test]
fn builtins_gated_by_config() {
    let mut fx = fixture();
    let src = "package main\n\nfunc main() {\n\t@\n}\n";
    let c = complete(&mut fx, src);
    assert!(!names(&c).contains(&"len"));

    let mut config = Config::default();
    config.propose_builtins = true;
    let mut fx = fixture_with(config);
    let c = complete(&mut fx, src);
    assert_eq!(get(&c, "len").class, DeclKind::Func);
    assert_eq!(get(&c, "int").class, DeclKind::Type);
}

#[test]
fn sibling_files_contribute_package_scope() {
    let mut fx = fixture();
    fs::write(
        fx.src.path().join("util.go"),
        "package main\n\nfunc Helper() int { return 1 }\n",
    )
    .unwrap();
    fs::write(
        fx.src.path().join("other.go"),
        "package other\n\nfunc Invisible() {}\n",
    )
    .unwrap();

    let c = complete(&mut fx, "package main\n\nfunc main() {\n\t@\n}\n");
    assert_eq!(get(&c, "Helper").typ, "func() int");
    assert!(!names(&c).contains(&"Invisible"));
}

#[test]
fn broken_function_preserves_siblings() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\n\
         var Count int\n\n\
         func Broken() {\n\tif Count > @\n}\n\n\
         func Helper() {}\n",
    );
    assert_eq!(get(&c, "Count").typ, "int");
    assert_eq!(get(&c, "Helper").class, DeclKind::Func);
    assert_eq!(get(&c, "Broken").class, DeclKind::Func);
}

#[test]
fn methods_stub_never_surfaces() {
    let mut fx = fixture();
    // Method precedes its receiver type; the type must come back whole.
    let c = complete(
        &mut fx,
        "package main\n\n\
         func (t *Tree) Walk() {}\n\n\
         type Tree struct{ Left int }\n\n\
         func main() {\n\t@\n}\n",
    );
    assert_eq!(get(&c, "Tree").class, DeclKind::Type);
    assert!(c
        .candidates
        .iter()
        .all(|x| x.class != DeclKind::MethodsStub));

    let c = complete(
        &mut fx,
        "package main\n\n\
         func (t *Tree) Walk() {}\n\n\
         type Tree struct{ Left int }\n\n\
         func main() {\n\tvar t Tree\n\tt.@\n}\n",
    );
    assert!(names(&c).contains(&"Walk"));
    assert!(names(&c).contains(&"Left"));
}

#[test]
fn drop_cache_round_trip_is_identical() {
    let mut fx = fixture();
    let src = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.@\n}\n";
    let first = complete(&mut fx, src);
    fx.session.drop_cache();
    let second = complete(&mut fx, src);
    assert_eq!(first.candidates, second.candidates);
    assert_eq!(first.partial_len, second.partial_len);
    assert!(!first.candidates.is_empty());
}

#[test]
fn repeated_requests_are_stable() {
    let mut fx = fixture();
    let src = "package main\n\nfunc main() {\n\tx := 1\n\t@\n}\n";
    let first = complete(&mut fx, src);
    let second = complete(&mut fx, src);
    assert_eq!(first.candidates, second.candidates);
    assert_eq!(get(&first, "x").typ, "int");
}

#[test]
fn cursor_at_offset_zero_offers_nothing_but_does_not_panic() {
    let mut fx = fixture();
    let c = complete(&mut fx, "@package main\n\nvar X int\n");
    assert_eq!(c.partial_len, 0);
    // Top-level position, no partial: file-scope names are fair game.
    assert!(c.candidates.iter().all(|x| x.class != DeclKind::MethodsStub));
}

#[test]
fn dot_without_an_expression_is_silent() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\nvar X int\n\nfunc main() {\n\t.@\n}\n",
    );
    assert!(c.candidates.is_empty(), "got {:?}", names(&c));
    assert_eq!(c.partial_len, 0);
}

#[test]
fn import_path_position_is_silent() {
    let mut fx = fixture();
    let c = complete(&mut fx, "package main\n\nimport \"fm@");
    assert!(c.candidates.is_empty());
    assert_eq!(c.partial_len, 0);
}

#[test]
fn cursor_on_function_opening_brace() {
    let mut fx = fixture();
    let c = complete(
        &mut fx,
        "package main\n\nvar X int\n\nfunc main() @{\n}\n",
    );
    assert!(names(&c).contains(&"X"));
}

#[test]
fn status_lists_cached_packages() {
    let mut fx = fixture();
    complete(
        &mut fx,
        "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.@\n}\n",
    );
    let status = fx.session.status();
    assert!(status.contains("fmt.a"));
    assert!(status.contains("unsafe"));
}
