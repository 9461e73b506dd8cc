mod prompt;

use std::path::PathBuf;

use clap::Parser;
use vfscore::{Fs, FsError};

/// Interactive virtual filesystem shell over a RAM block device image.
#[derive(Parser)]
#[command(name = "rvfs", about = "interactive virtual filesystem shell")]
struct Cli {
    /// Path to the on-disk image to load/save.
    #[arg(long, default_value = "disk.img")]
    image: PathBuf,

    /// Run a single command non-interactively instead of entering the REPL.
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,
}

enum Outcome {
    Continue,
    Exit(i32),
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut fs = match Fs::new() {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("rvfs: error: {e}");
            std::process::exit(1);
        }
    };

    if cli.image.exists() {
        match fs.device.load_image(&cli.image) {
            Ok(()) => {
                if let Err(e) = fs.meta_load() {
                    log::warn!("failed to load metadata: {e}");
                }
            }
            Err(e) => log::warn!("failed to load {}: {e}", cli.image.display()),
        }
    } else {
        log::info!(
            "no existing image at {}, starting with a fresh filesystem",
            cli.image.display()
        );
    }

    if let Some(command) = cli.command.clone() {
        if let Outcome::Exit(code) = run_line(&mut fs, &command) {
            save(&mut fs, &cli.image);
            std::process::exit(code);
        }
        save(&mut fs, &cli.image);
        return;
    }

    println!("rvfs — type 'help' for a list of commands");
    loop {
        let prompt_label = format!("{}> ", fs.get_cwd_path());
        let line = match prompt::read_line(&prompt_label) {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                eprintln!("rvfs: error: {e}");
                break;
            }
        };
        if let Outcome::Exit(code) = run_line(&mut fs, &line) {
            save(&mut fs, &cli.image);
            std::process::exit(code);
        }
    }
    save(&mut fs, &cli.image);
}

fn save(fs: &mut Fs, image: &PathBuf) {
    if let Err(e) = fs.meta_save() {
        eprintln!("rvfs: error: failed to save metadata: {e}");
        return;
    }
    if let Err(e) = fs.device.save_image(image) {
        eprintln!("rvfs: error: failed to save {}: {e}", image.display());
    }
}

fn run_line(fs: &mut Fs, line: &str) -> Outcome {
    let line = line.trim();
    if line.is_empty() {
        return Outcome::Continue;
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match cmd {
        "help" => {
            print_help();
            Outcome::Continue
        }
        "exit" => Outcome::Exit(0),
        "df" => {
            print_df(fs);
            Outcome::Continue
        }
        "id" => {
            println!("uid={} gid={}", fs.uid(), fs.gid());
            Outcome::Continue
        }
        "sudo" => {
            if rest.is_empty() {
                println!("usage: sudo <command>");
                return Outcome::Continue;
            }
            let mut guard = fs.sudo();
            run_line(&mut guard, rest)
        }
        "su" => {
            do_su(fs, rest);
            Outcome::Continue
        }
        "ls" => {
            do_ls(fs, rest);
            Outcome::Continue
        }
        "tree" => {
            do_tree(fs, rest);
            Outcome::Continue
        }
        "cd" => {
            report(fs.cd(rest));
            Outcome::Continue
        }
        "mkdir" => {
            report(fs.mkdir(rest));
            Outcome::Continue
        }
        "rmdir" => {
            report(fs.rmdir(rest));
            Outcome::Continue
        }
        "touch" => {
            report(fs.create_file(rest));
            Outcome::Continue
        }
        "stat" => {
            do_stat(fs, rest);
            Outcome::Continue
        }
        "cp" => {
            do_cp(fs, rest);
            Outcome::Continue
        }
        "write" => {
            do_write(fs, rest);
            Outcome::Continue
        }
        "cat" => {
            do_cat(fs, rest);
            Outcome::Continue
        }
        "rm" => {
            report(fs.rm(rest));
            Outcome::Continue
        }
        "chmod" => {
            do_chmod(fs, rest);
            Outcome::Continue
        }
        "import" => {
            do_import(fs, rest);
            Outcome::Continue
        }
        "export" => {
            do_export(fs, rest);
            Outcome::Continue
        }
        other => {
            println!("Unknown command: {other}");
            Outcome::Continue
        }
    }
}

fn report<T>(result: Result<T, FsError>) {
    if let Err(e) = result {
        println!("rvfs: error: {e}");
    }
}

fn print_help() {
    println!(
        "commands:\n\
         \u{20}help, exit, df, id\n\
         \u{20}sudo <cmd>, su [name]\n\
         \u{20}ls [-l] [path], tree [path], cd <path>\n\
         \u{20}mkdir <path>, rmdir <path>, touch <path>, stat <path>\n\
         \u{20}write <path> <text>, cat <path>, cp <src> <dst>, rm <path>\n\
         \u{20}chmod <octal> <path>\n\
         \u{20}import <host-path> <vpath>, export <vpath> <host-path>"
    );
}

fn print_df(fs: &Fs) {
    println!(
        "blocks: {}/{} used  ({} bytes free of {})",
        fs.device.used_blocks(),
        fs.device.total_blocks(),
        fs.device.free_size(),
        fs.device.total_size()
    );
}

fn do_su(fs: &mut Fs, rest: &str) {
    let name = if rest.is_empty() { "root" } else { rest };
    match prompt::read_password(&format!("Password for {name}: ")) {
        Ok(password) => {
            if fs.switch_user(name, &password).is_err() {
                println!("su: authentication failure");
            }
        }
        Err(e) => eprintln!("rvfs: error: {e}"),
    }
}

fn do_ls(fs: &Fs, rest: &str) {
    let (long, path) = match rest.split_once(char::is_whitespace) {
        Some((flag, p)) if flag == "-l" => (true, p.trim()),
        None if rest == "-l" => (true, ""),
        _ => (false, rest),
    };

    if long {
        let entries = if path.is_empty() {
            fs.ls_long()
        } else {
            fs.ls_long_path(path)
        };
        match entries {
            Ok(entries) => {
                for e in entries {
                    println!(
                        "{} {:>3} {:>4} {:>4} {:>6} {}",
                        e.mode_string, e.nlink, e.uid, e.gid, e.size, e.name
                    );
                }
            }
            Err(err) => println!("rvfs: error: {err}"),
        }
    } else {
        let names = if path.is_empty() {
            Ok(fs.ls())
        } else {
            fs.ls_path(path)
        };
        match names {
            Ok(names) => println!("{}", names.join("  ")),
            Err(err) => println!("rvfs: error: {err}"),
        }
    }
}

fn do_tree(fs: &Fs, rest: &str) {
    let path = if rest.is_empty() { None } else { Some(rest) };
    match fs.tree(path) {
        Ok(s) => print!("{s}"),
        Err(e) => println!("rvfs: error: {e}"),
    }
}

fn do_stat(fs: &Fs, rest: &str) {
    match fs.stat(rest) {
        Ok(st) => {
            println!("  File: {}", st.path);
            println!(
                "  Size: {}\tBlocks: {}\tType: {}",
                st.size,
                st.blocks,
                if st.kind == vfscore::InodeType::Dir {
                    "directory"
                } else {
                    "regular file"
                }
            );
            println!("  Inode: {}\tLinks: {}", st.ino, st.nlink);
            println!("  Access: (0{:o})\tUid: {}\tGid: {}", st.mode, st.uid, st.gid);
            println!("  Modify: {}", st.mtime);
        }
        Err(e) => println!("rvfs: error: {e}"),
    }
}

fn do_cp(fs: &mut Fs, rest: &str) {
    let mut it = rest.split_whitespace();
    match (it.next(), it.next()) {
        (Some(src), Some(dst)) => report(fs.cp(src, dst)),
        _ => println!("usage: cp <src> <dst>"),
    }
}

fn do_write(fs: &mut Fs, rest: &str) {
    let mut parts = rest.splitn(2, char::is_whitespace);
    match (parts.next(), parts.next()) {
        (Some(path), Some(text)) if !path.is_empty() => {
            report(fs.write_all(path, text.as_bytes()));
        }
        _ => println!("usage: write <path> <text>"),
    }
}

fn do_cat(fs: &Fs, rest: &str) {
    let mut out = Vec::new();
    match fs.cat(rest, &mut out) {
        Ok(()) => {
            use std::io::Write;
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let _ = lock.write_all(&out);
            let _ = lock.write_all(b"\n");
        }
        Err(e) => println!("rvfs: error: {e}"),
    }
}

fn do_chmod(fs: &mut Fs, rest: &str) {
    let mut it = rest.split_whitespace();
    match (it.next(), it.next()) {
        (Some(mode_str), Some(path)) => match u16::from_str_radix(mode_str, 8) {
            Ok(mode) => report(fs.chmod(path, mode)),
            Err(_) => println!("chmod: invalid mode: {mode_str}"),
        },
        _ => println!("usage: chmod <octal-mode> <path>"),
    }
}

fn do_import(fs: &mut Fs, rest: &str) {
    let mut it = rest.split_whitespace();
    match (it.next(), it.next()) {
        (Some(host), Some(vpath)) => report(fs.import(std::path::Path::new(host), vpath)),
        _ => println!("usage: import <host-path> <vpath>"),
    }
}

fn do_export(fs: &Fs, rest: &str) {
    let mut it = rest.split_whitespace();
    match (it.next(), it.next()) {
        (Some(vpath), Some(host)) => report(fs.export(vpath, std::path::Path::new(host))),
        _ => println!("usage: export <vpath> <host-path>"),
    }
}
