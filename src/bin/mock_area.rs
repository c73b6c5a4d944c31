//! Mock area program for integration testing
//!
//! Behaves like a small numeric program: given a radius on the command line
//! it prints the radius and the area of the circle. With `--files` it reads
//! radii from `area_files.inp` and writes `area_files.out` instead. Extra
//! flags let tests force slow, failing or unparsable invocations.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

#[derive(Default)]
struct Options {
    files: bool,
    no_output: bool,
    sleep_ms: u64,
    delay_ms_per_unit: u64,
    garbage_on: Option<f64>,
    exit_code: Option<i32>,
    positional: Vec<String>,
}

fn main() {
    let options = parse_args();

    if options.files {
        std::process::exit(run_files(&options));
    }

    if options.positional.len() != 1 {
        println!("usage: mock_area <radius>");
        println!("Try again!");
        return;
    }

    let radius: f64 = options.positional[0].parse().unwrap_or(0.0);

    let mut delay = options.sleep_ms;
    if options.delay_ms_per_unit > 0 {
        // Larger radii finish sooner, so a pool completes out of order
        let units = (10.0 - radius).max(0.0);
        delay += (units * options.delay_ms_per_unit as f64) as u64;
    }
    if delay > 0 {
        std::thread::sleep(Duration::from_millis(delay));
    }

    if options.garbage_on == Some(radius) {
        println!("something went wrong, no result");
    } else {
        println!("radius = {},  area = {}", radius, PI * radius * radius);
    }

    if let Some(code) = options.exit_code {
        std::process::exit(code);
    }
}

fn parse_args() -> Options {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--files" => options.files = true,
            "--no-output" => options.no_output = true,
            "--sleep-ms" => options.sleep_ms = next_number(&mut args),
            "--delay-ms-per-unit" => options.delay_ms_per_unit = next_number(&mut args),
            "--garbage-on" => options.garbage_on = args.next().and_then(|v| v.parse().ok()),
            "--exit-code" => options.exit_code = args.next().and_then(|v| v.parse().ok()),
            _ => options.positional.push(arg),
        }
    }
    options
}

fn next_number(args: &mut impl Iterator<Item = String>) -> u64 {
    args.next().and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Batch mode; returns the process exit code
fn run_files(options: &Options) -> i32 {
    let input = match File::open("area_files.inp") {
        Ok(file) => file,
        Err(_) => {
            eprintln!("Unable to open area_files.inp.");
            return 1;
        }
    };

    let mut output: Option<File> = if options.no_output {
        None
    } else {
        match File::create("area_files.out") {
            Ok(mut file) => {
                let _ = writeln!(file, "#  radius      area   ");
                Some(file)
            }
            Err(_) => return 1,
        }
    };

    for line in BufReader::new(input).lines().map_while(Result::ok) {
        if line.starts_with('#') {
            println!("comment line: {}", line);
            continue;
        }
        let Some(radius) = line.split_whitespace().next().and_then(|t| t.parse::<f64>().ok())
        else {
            continue;
        };
        if let Some(file) = output.as_mut() {
            let _ = writeln!(file, "{:8.2}  {:12.3}", radius, PI * radius * radius);
        }
    }

    options.exit_code.unwrap_or(0)
}
