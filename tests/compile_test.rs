use serde_json::json;
use std::fs;
use std::path::PathBuf;
use subcode::{compile, compile_file, CompileOptions, Error, ErrorKind, Syntax};
use tempfile::TempDir;

fn views() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("simple.html"), "<p>{{= text }}</p>\n").unwrap();
    let test_file = dir.path().join("test.html");
    (dir, test_file)
}

#[tokio::test]
async fn test_simple() {
    let tm = compile("Hello {{= name }}!", &CompileOptions::default())
        .await
        .unwrap();
    assert_eq!(tm.render(&json!({"name": "World"})).unwrap(), "Hello World!");
}

#[tokio::test]
async fn test_simple_file() {
    let (dir, _) = views();
    let tm = compile_file(dir.path().join("simple.html"), &CompileOptions::default())
        .await
        .unwrap();
    assert!(tm.render(&json!({"text": "Test"})).unwrap().starts_with("<p>Test</p>"));
}

#[tokio::test]
async fn test_includes() {
    let (_dir, test_file) = views();
    let options = CompileOptions::default().with_filename(test_file);
    let tm = compile(
        r#"{{: include("simple", "simple.html") }}{{- simple({text = "Included"}) }}"#,
        &options,
    )
    .await
    .unwrap();
    assert!(tm.render(&json!(null)).unwrap().starts_with("<p>Included</p>"));
}

#[tokio::test]
async fn test_multi_include() {
    let (_dir, test_file) = views();
    let options = CompileOptions::default().with_filename(test_file);
    let tm = compile(
        r#"{{: include_all({s1 = "simple.html", s2 = "simple.html"}) }}{{- s1({text = "1"}) .. s2({text = "2"}) }}"#,
        &options,
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "<p>1</p>\n<p>2</p>\n");
}

#[tokio::test]
async fn test_includes_use_parent_locals() {
    let (_dir, test_file) = views();
    let options = CompileOptions::default().with_filename(test_file);
    let tm = compile(
        r#"{{: include("simple", "simple.html") }}{{- simple() }}"#,
        &options,
    )
    .await
    .unwrap();
    assert!(tm
        .render(&json!({"text": "Parent"}))
        .unwrap()
        .starts_with("<p>Parent</p>"));
}

#[tokio::test]
async fn test_inline_template() {
    let tm = compile(
        r#"{{: template("inline", function() }}{{= value }}{{: end) }}{{- inline() }}, {{- inline({value = value * 2}) }}"#,
        &CompileOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!({"value": 7})).unwrap(), "7, 14");
}

#[tokio::test]
async fn test_emit_control_code() {
    let tm = compile(
        r#"{{: write("local value = 42") }}{{= value }}"#,
        &CompileOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "42");
}

#[tokio::test]
async fn test_emit_control_code_with_escaped_literals() {
    let tm = compile(
        r#"{{: write("local value = '" .. string_escape("a'b") .. "'") }}{{- value }}"#,
        &CompileOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "a'b");
}

#[tokio::test]
async fn test_filename() {
    let options = CompileOptions::default().with_filename("a/b.html");
    let tm = compile(
        r#"{{: write("local value = '" .. string_escape(filename) .. "'") }}{{- value }}"#,
        &options,
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "a/b.html");
}

#[tokio::test]
async fn test_dirname() {
    let options = CompileOptions::default().with_filename("a/b.html");
    let tm = compile(
        r#"{{: write("local value = '" .. string_escape(dirname) .. "'") }}{{- value }}"#,
        &options,
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "a");
}

#[tokio::test]
async fn test_extend() {
    let options = CompileOptions::default().extend(|env| {
        let writer = env.writer();
        env.register("embed_magic", move |_, ()| {
            writer.write("local magic = 42");
            Ok(())
        })
    });
    let tm = compile("{{: embed_magic() }}{{= magic }}", &options)
        .await
        .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "42");
}

#[tokio::test]
async fn test_async_templates() {
    let options = CompileOptions::default().asynchronous(true);
    let tm = compile("{{= value }}", &options).await.unwrap();
    assert!(tm.is_async());

    let rendering = tm.execute(json!({"value": 42}));
    assert!(rendering.is_pending());
    assert_eq!(rendering.output().await.unwrap(), "42");
    assert_eq!(tm.render_async(json!({"value": 43})).await.unwrap(), "43");
}

#[tokio::test]
async fn test_embed() {
    let tm = compile(
        r#"{{: embed("test", {foo = "bar"}) }}{{= test.foo }}"#,
        &CompileOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "bar");
}

#[tokio::test]
async fn test_embed_from_external_code() {
    let options = CompileOptions::default().extend(|env| env.embed("test", &json!({"foo": "bar"})));
    let tm = compile("a, {{= test.foo }}, b", &options).await.unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "a, bar, b");
}

#[tokio::test]
async fn test_output_from_compile_time_code() {
    let tm = compile(r#"a, {{: output("b") }}, c"#, &CompileOptions::default())
        .await
        .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "a, b, c");
}

#[tokio::test]
async fn test_escaping() {
    let tm = compile("{{= v }}|{{- v }}", &CompileOptions::default())
        .await
        .unwrap();
    assert_eq!(tm.render(&json!({"v": "&"})).unwrap(), "&amp;|&");
}

#[tokio::test]
async fn test_literal_round_trip() {
    let text = "plain \"text\" with 'quotes', \\ backslashes\nand ]] brackets\t\u{1}";
    let tm = compile(text, &CompileOptions::default()).await.unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), text);
}

#[tokio::test]
async fn test_control_flow() {
    let tm = compile(
        "<ul>{{ for _, item in ipairs(items) do }}<li>{{= item }}</li>{{ end }}</ul>",
        &CompileOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(
        tm.render(&json!({"items": ["a", "b"]})).unwrap(),
        "<ul><li>a</li><li>b</li></ul>"
    );
}

#[tokio::test]
async fn test_compile_time_loop_unrolls() {
    let tm = compile(
        "{{: for i = 1, 3 do }}[{{= i }}]{{: end }}",
        &CompileOptions::default(),
    )
    .await
    .unwrap();
    // The loop runs while compiling; `i` is a runtime name, unbound in locals
    assert_eq!(tm.render(&json!({"i": 0})).unwrap(), "[0][0][0]");
}

#[tokio::test]
async fn test_explicit_scope() {
    let options = CompileOptions::default().with_use_with(false);
    let tm = compile("{{= locals.name }} {{= name }}", &options)
        .await
        .unwrap();
    assert_eq!(tm.render(&json!({"name": "x"})).unwrap(), "x nil");
}

#[tokio::test]
async fn test_template_with_explicit_scope() {
    let tm = compile(
        r#"{{: template("row", { use_with = false }, function() }}{{= locals.cell }}{{: end) }}{{- row({cell = "c"}) }}"#,
        &CompileOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "c");
}

#[tokio::test]
async fn test_custom_syntax() {
    let syntax = Syntax {
        open: "<?".into(),
        close: "?>".into(),
        ..Syntax::default()
    };
    let options = CompileOptions::default().with_syntax(syntax);
    let tm = compile("Hello <?= name ?>!<?# hidden ?>", &options).await.unwrap();
    assert_eq!(tm.render(&json!({"name": "World"})).unwrap(), "Hello World!");
}

#[tokio::test]
async fn test_sandboxed_directives() {
    let options = CompileOptions::default();
    compile(
        "{{: assert(io == nil and os == nil and debug == nil and load == nil) }}",
        &options,
    )
    .await
    .unwrap();

    let tm = compile("{{= type(os) }}", &options).await.unwrap();
    assert_eq!(tm.render(&json!(null)).unwrap(), "nil");
}

#[tokio::test]
async fn test_relative_include_without_filename() {
    let err = compile(
        r#"{{: include("simple", "./simple.html") }}"#,
        &CompileOptions::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(matches!(err, Error::Resolution { .. }));
}

#[tokio::test]
async fn test_syntax_error_position() {
    let err = compile("a {{= 'oops }}", &CompileOptions::default())
        .await
        .unwrap_err();
    let position = err.position().unwrap();
    assert_eq!((position.line, position.column), (1, 7));
    assert!(err.to_string().contains("expected end of string literal"));
}

#[tokio::test]
async fn test_directive_error_reports_source_line() {
    let options = CompileOptions::default().with_filename("page.html");
    let err = compile("line one\n\n{{: error('boom') }}", &options)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Directive);
    let message = err.to_string();
    assert!(message.contains("page.html:3:"), "{}", message);
    assert!(message.contains("boom"));
}

#[tokio::test]
async fn test_invalid_directive_code() {
    let err = compile("{{: if then }}", &CompileOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "E_DIRECTIVE");
}

#[tokio::test]
async fn test_render_error() {
    let tm = compile("{{= missing.field }}", &CompileOptions::default())
        .await
        .unwrap();
    let err = tm.render(&json!(null)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
}

#[tokio::test]
async fn test_custom_escaper() {
    let options =
        CompileOptions::default().with_escaper(subcode::escape::escaper(|s| s.to_uppercase()));
    let tm = compile("{{= word }}", &options).await.unwrap();
    assert_eq!(tm.render(&json!({"word": "loud"})).unwrap(), "LOUD");
}
