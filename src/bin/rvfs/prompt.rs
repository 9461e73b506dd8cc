use std::io::{self, Write};
use std::mem::MaybeUninit;

/// Reads one line from stdin with normal terminal echo. Returns `None`
/// on EOF so the caller can tell "blank line" from "stream closed".
pub fn read_line(label: &str) -> io::Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    let n = io::stdin().read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Reads one line with terminal echo disabled, for password prompts.
/// Falls back to a normal (echoed) read if stdin isn't a real terminal.
pub fn read_password(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;

    let fd = libc::STDIN_FILENO;
    let mut original: MaybeUninit<libc::termios> = MaybeUninit::uninit();
    let got_attrs = unsafe { libc::tcgetattr(fd, original.as_mut_ptr()) } == 0;

    if got_attrs {
        let original = unsafe { original.assume_init() };
        let mut hidden = original;
        hidden.c_lflag &= !libc::ECHO;
        hidden.c_lflag |= libc::ECHONL;
        unsafe { libc::tcsetattr(fd, libc::TCSANOW, &hidden) };

        let mut line = String::new();
        let result = io::stdin().read_line(&mut line);

        unsafe { libc::tcsetattr(fd, libc::TCSANOW, &original) };
        result?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    } else {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        println!();
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}
