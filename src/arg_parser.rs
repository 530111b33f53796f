use std::{io::Write, path::PathBuf};

use argparse::{ArgumentParser, Print, StoreOption, StoreTrue};

// Exit status used for every usage error
pub const USAGE_EXIT: i32 = 2;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArgsOptions {
    // Device index, validated as a non negative integer after parsing
    pub index: Option<u32>,

    pub core_offset: Option<i32>,
    pub mem_offset: Option<i32>,
    // Power limit in watts
    pub power_watts: Option<u32>,

    // Skip the confirmation prompt
    pub yes: bool,

    pub config_file_path: Option<PathBuf>,
}

// Result of a parse that did not produce options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseExit {
    // Help or version was printed, the process ends successfully
    Done,
    // Usage error, the process ends with the given status
    Usage(i32),
}

impl ParseExit {
    pub fn code(self) -> i32 {
        match self {
            ParseExit::Done => 0,
            ParseExit::Usage(code) => code,
        }
    }
}

impl ArgsOptions {
    // Parse the process arguments, printing usage or version as needed
    pub fn parse() -> Result<Self, ParseExit> {
        Self::parse_from(
            std::env::args().collect(),
            &mut std::io::stdout(),
            &mut std::io::stderr(),
        )
    }

    // The first element of args is the program name
    pub fn parse_from(
        args: Vec<String>,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<Self, ParseExit> {
        let mut options = ArgsOptions::default();

        // Raw index, argparse would happily take the next flag as its value
        let mut index: Option<String> = None;

        // Kept to repeat the usage on errors found after parsing
        let program = args.first().cloned().unwrap_or_default();
        let mut usage: Vec<u8> = Vec::new();

        {
            let mut parser = ArgumentParser::new();
            parser.set_description(
                "Configure per GPU overclocking through a systemd template service",
            );

            parser.refer(&mut index).metavar("ID").add_option(
                &["--index"],
                StoreOption,
                "Index of the GPU to configure, skips the interactive menu",
            );
            parser.refer(&mut options.core_offset).metavar("MHZ").add_option(
                &["--core"],
                StoreOption,
                "Core clock offset in MHz, may be negative",
            );
            parser.refer(&mut options.mem_offset).metavar("MHZ").add_option(
                &["--mem"],
                StoreOption,
                "Memory clock offset in MHz, may be negative",
            );
            parser.refer(&mut options.power_watts).metavar("WATTS").add_option(
                &["--power"],
                StoreOption,
                "Power limit in watts",
            );
            parser.refer(&mut options.yes).add_option(
                &["-y", "--yes"],
                StoreTrue,
                "Apply without asking for confirmation",
            );

            // Configuration file path
            parser.refer(&mut options.config_file_path).metavar("PATH").add_option(
                &["-c", "--config"],
                StoreOption,
                "The file path of the configuration file",
            );

            // Show tool version
            parser.add_option(
                &["-V", "--version"],
                Print(env!("CARGO_PKG_VERSION").to_string()),
                "Show the tool version",
            );

            match parser.parse(args, stdout, stderr) {
                Ok(()) => {}
                Err(0) => return Err(ParseExit::Done),
                Err(_) => return Err(ParseExit::Usage(USAGE_EXIT)),
            }

            let _ = parser.print_usage(&program, &mut usage);
        }

        if let Some(raw) = index {
            match raw.parse::<u32>() {
                Ok(i) => options.index = Some(i),
                Err(_) => {
                    let _ = stderr.write_all(&usage);
                    let _ = writeln!(stderr, "Invalid value for --index: \"{raw}\"");
                    return Err(ParseExit::Usage(USAGE_EXIT));
                }
            }
        }

        Ok(options)
    }
}
