use std::path::Path;

use modelpack_core::CONFIG_FILE_NAME;

/// Write a commented modelpack.toml into the current directory.
pub fn init_project() -> anyhow::Result<()> {
    let config_path = Path::new(CONFIG_FILE_NAME);
    if config_path.exists() {
        eprintln!("{CONFIG_FILE_NAME} already exists, skipping");
        return Ok(());
    }

    let template = r#"[build]
# gpu = false
python_version = "3.8"
# cuda = "11.8.0"
# cudnn = "8"
# system_packages = ["ffmpeg"]
# python_packages = ["torch==2.1.0"]
# python_requirements = "requirements.txt"
# run = ["echo hello"]
# server_package = "cog"
# server_wheel = "dist/cog-0.0.1.dev-py3-none-any.whl"
# pip_index_url = "https://pypi.org/simple"

[layers]
# group_files = true
# max_file_groups = 1
# size_threshold = 200000000
"#;
    std::fs::write(config_path, template)?;
    println!("Created {CONFIG_FILE_NAME}");

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Edit {CONFIG_FILE_NAME} for your model");
    println!();
    println!("  2. Generate the Dockerfile:");
    println!("     modelpack dockerfile -o Dockerfile --keep-staging");
    println!();
    println!("  3. Build the image:");
    println!("     docker build -t my-model .");

    Ok(())
}
