use std::path::PathBuf;

use anyhow::Context;

pub(crate) struct Args {
    pub config_path: PathBuf,
    pub command: String,
    pub config_file: Option<String>,
    pub layout: Option<String>,
    pub xdg_seat: Option<String>,
    pub allow_tcp: bool,
    pub vt: i32,
    pub add_args: Vec<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/lightdm/lightdm.conf"),
            command: "X".to_string(),
            config_file: None,
            layout: None,
            xdg_seat: None,
            allow_tcp: false,
            vt: -1,
            add_args: Vec::new(),
        }
    }
}

pub(crate) fn parse_args() -> anyhow::Result<Args> {
    let mut parsed = Args::default();

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-V" | "--version" => {
                println!("xsupervisord {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-h" | "--help" => {
                println!("xsupervisord - local X-server supervisor");
                println!();
                println!("USAGE:");
                println!("    xsupervisord [OPTIONS] [-- X-SERVER-ARGS...]");
                println!();
                println!("OPTIONS:");
                println!(
                    "    --config <PATH>        LightDM config file [default: /etc/lightdm/lightdm.conf]"
                );
                println!("    --xserver-command <CMD>    X server binary or full command [default: X]");
                println!("    --xserver-config <PATH>    X server -config file");
                println!("    --layout <NAME>        X server -layout");
                println!("    --seat <ID>            seat ID passed via -seat");
                println!("    --allow-tcp            permit TCP listening on the X server");
                println!("    --vt <NUMBER>          virtual terminal to bind to [default: none]");
                println!("    -V, --version          print version and exit");
                println!("    -h, --help             print this help and exit");
                std::process::exit(0);
            }
            "--config" => {
                i += 1;
                parsed.config_path = PathBuf::from(args.get(i).context("Missing --config value")?);
            }
            "--xserver-command" => {
                i += 1;
                parsed.command = args.get(i).context("Missing --xserver-command value")?.clone();
            }
            "--xserver-config" => {
                i += 1;
                parsed.config_file =
                    Some(args.get(i).context("Missing --xserver-config value")?.clone());
            }
            "--layout" => {
                i += 1;
                parsed.layout = Some(args.get(i).context("Missing --layout value")?.clone());
            }
            "--seat" => {
                i += 1;
                parsed.xdg_seat = Some(args.get(i).context("Missing --seat value")?.clone());
            }
            "--allow-tcp" => {
                parsed.allow_tcp = true;
            }
            "--vt" => {
                i += 1;
                parsed.vt = args
                    .get(i)
                    .context("Missing --vt value")?
                    .parse()
                    .context("Invalid --vt value")?;
            }
            "--" => {
                parsed.add_args.extend(args[i + 1..].iter().cloned());
                break;
            }
            other => anyhow::bail!("Unknown argument: {other}"),
        }
        i += 1;
    }

    Ok(parsed)
}
