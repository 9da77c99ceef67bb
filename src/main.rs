use lantern::config::Config;
use lantern::interpreter::{Interpreter, Outcome};
use lantern::machine::Machine;
use lantern::screen::{auto_screen, HeadlessScreen};
use lantern::zrand::ZRand;
use log::info;
use std::fs::File;
use std::io::prelude::*;
use std::path::PathBuf;
use std::process;

fn usage() -> ! {
    eprintln!("usage: lantern [--headless] <story-file>");
    process::exit(2);
}

fn main() {
    env_logger::init();

    let mut story_path: Option<PathBuf> = None;
    let mut headless = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--headless" => headless = true,
            "-h" | "--help" => usage(),
            _ if story_path.is_none() => story_path = Some(PathBuf::from(arg)),
            _ => usage(),
        }
    }
    let story_path = story_path.unwrap_or_else(|| usage());

    let mut all_bytes = Vec::new();
    match File::open(&story_path) {
        Ok(mut f) => {
            if let Err(e) = f.read_to_end(&mut all_bytes) {
                eprintln!("Cannot read {}: {e}", story_path.display());
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Cannot open {}: {e}", story_path.display());
            process::exit(1);
        }
    }

    let config = Config::load_near(&story_path);
    let mut screen = auto_screen(headless || config.headless);
    if let (Some(w), Some(h)) = (config.screen_width, config.screen_height) {
        if let Some(hs) = screen.as_any_mut().downcast_mut::<HeadlessScreen>() {
            hs.set_size(w, h);
        }
    }

    let mut machine = match Machine::new(all_bytes, screen) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("Cannot load {}: {e}", story_path.display());
            process::exit(1);
        }
    };
    if let Some(seed) = config.seed {
        machine.rng = ZRand::new_predictable(seed);
    }
    if let Some(ref path) = config.transcript {
        machine.io.preset_transcript_path(path.clone());
    }
    if let Err(e) = machine.initialize() {
        eprintln!("Cannot initialize: {e}");
        process::exit(1);
    }
    info!("running {}", story_path.display());

    let mut interp = Interpreter::new(machine);
    loop {
        match interp.run() {
            Ok(Outcome::Quit) | Ok(Outcome::LimitReached) => {
                interp.machine.io.screen.quit();
                break;
            }
            Ok(Outcome::Restart) => {
                if let Err(e) = interp.machine.restart() {
                    interp.machine.io.screen.fatal(&e);
                    process::exit(1);
                }
            }
            Err(e) => {
                interp.machine.io.screen.fatal(&e);
                process::exit(1);
            }
        }
    }
}
