use std::path::PathBuf;

use retrocomp::{FormatName, Script, Step};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_retrocomp")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "retrocomp.exe"
            } else {
                "retrocomp"
            });
            p
        })
}

#[test]
fn cli_frame_writes_png() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();

    let script_path = dir.join("script.json");
    let out_path = dir.join("out.png");
    let _ = std::fs::remove_file(&out_path);

    let script = Script {
        window: [40, 25],
        settings: None,
        steps: vec![
            Step::SetGameSize {
                width: 40,
                height: 25,
                format: FormatName::Clut8,
            },
            Step::SetPalette {
                start: 0,
                colors: vec![0, 0, 0, 0, 128, 255],
            },
            Step::FillScreen { color: 1 },
            Step::UpdateScreen,
        ],
    };
    let f = std::fs::File::create(&script_path).unwrap();
    serde_json::to_writer_pretty(f, &script).unwrap();

    let script_arg = script_path.to_string_lossy().to_string();
    let out_arg = out_path.to_string_lossy().to_string();
    let status = std::process::Command::new(exe())
        .args(["frame", "--in", script_arg.as_str(), "--out"])
        .arg(out_arg.as_str())
        .status()
        .unwrap();

    assert!(status.success());
    let img = image::open(&out_path).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (40, 25));
    assert_eq!(img.get_pixel(20, 12).0, [0, 128, 255, 255]);
}

#[test]
fn cli_lists_formats() {
    let out = std::process::Command::new(exe())
        .arg("formats")
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.lines().any(|l| l.starts_with("clut8")));
    assert!(text.lines().any(|l| l.starts_with("rgb565")));
}

#[test]
fn cli_rejects_a_broken_script() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();
    let script_path = dir.join("broken.json");
    std::fs::write(&script_path, r#"{"window": [0, 0], "steps": []}"#).unwrap();

    let status = std::process::Command::new(exe())
        .args(["frame", "--in"])
        .arg(&script_path)
        .args(["--out", "target/cli_smoke/never.png"])
        .status()
        .unwrap();
    assert!(!status.success());
}
