//! 命令行冒烟测试

use std::fs;

use assert_cmd::Command;

#[test]
fn test_help() {
    let output = Command::cargo_bin("chat-translator")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--feed"));
    assert!(stdout.contains("--api-url"));
}

#[test]
fn test_env_docs() {
    let output = Command::cargo_bin("chat-translator")
        .unwrap()
        .arg("--env-docs")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CHAT_TRANSLATOR_API_URL"));
}

#[test]
fn test_write_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat-translator.toml");

    Command::cargo_bin("chat-translator")
        .unwrap()
        .arg("--write-config")
        .arg(&path)
        .assert()
        .success();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("api_url"));
}

#[test]
fn test_missing_input_fails() {
    Command::cargo_bin("chat-translator")
        .unwrap()
        .arg("/definitely/not/here.html")
        .assert()
        .failure();
}

#[test]
fn test_unreachable_provider_leaves_page_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("chat.html");
    let output = dir.path().join("out.html");
    fs::write(
        &input,
        r#"<html><body><div data-a-target="chat-scrollable-area"><div class="chat-line__message"><span class="text-fragment">hello world</span></div></div></body></html>"#,
    )
    .unwrap();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    Command::cargo_bin("chat-translator")
        .unwrap()
        .env("HOME", dir.path())
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("-l")
        .arg("es")
        .arg("--api-url")
        .arg(format!("http://{}/translate", addr))
        .arg("--run-ms")
        .arg("1500")
        .assert()
        .success();

    let html = fs::read_to_string(&output).unwrap();
    assert!(html.contains("hello world"));
    assert!(!html.contains("translation-indicator"));
}
