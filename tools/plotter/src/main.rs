use clap::Parser;
use eframe::{run_native, App, NativeOptions};
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;

use turntable_algo::telemetry::Tag;

mod link;
mod series;

use link::Link;
use series::DataPoint;

const HISTORY_LENGTH: usize = 10000;
const QUEUE_SIZE: usize = 4096;

#[derive(Parser)]
#[command(name = "plotter")]
#[command(about = "Live view and tuning console of the turntable speed loop", long_about = None)]
struct Cli {
    /// Serial port of the controller console, e.g. /dev/ttyUSB0
    port: String,
    /// Line rate of the console
    #[arg(short, long, default_value_t = 74_880)]
    baud: u32,
    /// Directory receiving the CSV exports
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
}

struct PlotApp {
    link: Arc<Link>,
    status: Arc<Mutex<String>>,
    output: PathBuf,
    paused: bool,
    display_data: Vec<DataPoint>,
    visible: [bool; 3],
    history_length: usize,
    command: String,
    running: Option<bool>,
}

impl PlotApp {
    fn drain(&mut self) {
        while let Some(point) = self.link.points.pop() {
            self.display_data.push(point);
        }
        while let Some(running) = self.link.running.pop() {
            self.running = Some(running);
        }
        // Maintain history length
        if self.display_data.len() > self.history_length {
            self.display_data
                .drain(0..self.display_data.len() - self.history_length);
        }
    }

    fn send(&mut self, line: String) {
        if self.link.outgoing.push(line).is_err() {
            eprintln!("Command queue full");
        }
    }

    fn save_csv(&self) -> std::io::Result<()> {
        for tag in series::PLOTTED {
            let path = self.output.join(format!("{}.csv", series::file_stem(tag)));
            let mut out = BufWriter::new(File::create(path)?);
            series::write_csv(&mut out, tag, &self.display_data)?;
        }
        Ok(())
    }

    fn line(&self, tag: Tag) -> Line {
        let points: PlotPoints = self
            .display_data
            .iter()
            .filter(|p| p.tag == tag)
            .map(|p| [p.time, p.value])
            .collect();
        Line::new(points).name(series::label(tag)).color(tag_color(tag))
    }
}

impl App for PlotApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.paused {
            self.drain();
        }

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button(if self.paused { "Resume" } else { "Pause" }).clicked() {
                    self.paused = !self.paused;
                }

                ui.add(
                    egui::Slider::new(&mut self.history_length, 100..=50000)
                        .text("History Length")
                        .logarithmic(true),
                );

                for (visible, tag) in self.visible.iter_mut().zip(series::PLOTTED) {
                    ui.checkbox(visible, series::label(tag));
                }

                if ui.button("Save CSV").clicked() {
                    if let Err(e) = self.save_csv() {
                        eprintln!("Error saving CSV: {:?}", e);
                    }
                }
            });

            ui.horizontal(|ui| {
                let edit = ui.add(
                    egui::TextEdit::singleline(&mut self.command).hint_text("Kp=-0.0002"),
                );
                let entered = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Send").clicked() || entered {
                    let line = std::mem::take(&mut self.command);
                    self.send(line);
                }
                if ui.button("run?").clicked() {
                    self.send("run?".into());
                }
                if ui.button("lift").clicked() {
                    self.send("lift".into());
                }

                let running = match self.running {
                    Some(true) => "running",
                    Some(false) => "stopped",
                    None => "-",
                };
                ui.label(format!(
                    "acks: {}  motor: {}  {}",
                    self.link.acks.load(Ordering::Relaxed),
                    running,
                    self.status.lock().map(|s| s.clone()).unwrap_or_default()
                ));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            Plot::new("Speed loop")
                .legend(Legend::default())
                .show(ui, |plot_ui| {
                    for (visible, tag) in self.visible.iter().zip(series::PLOTTED) {
                        if *visible {
                            plot_ui.line(self.line(tag));
                        }
                    }
                });
        });

        if !self.paused {
            ctx.request_repaint();
        }
    }
}

fn tag_color(tag: Tag) -> Color32 {
    match tag {
        Tag::RawDuration => Color32::from_rgb(120, 120, 220),
        Tag::Average => Color32::from_rgb(230, 160, 40),
        Tag::Control => Color32::from_rgb(60, 190, 90),
        Tag::Running => Color32::GRAY,
    }
}

fn main() {
    let cli = Cli::parse();

    let link = Arc::new(Link::new(QUEUE_SIZE));
    let status = Arc::new(Mutex::new(String::new()));

    let link_clone = link.clone();
    let status_clone = status.clone();
    let port = cli.port.clone();
    thread::spawn(move || {
        if let Err(e) = link::connect_and_read(link_clone, &port, cli.baud) {
            eprintln!("Error in data collection: {:?}", e);
            if let Ok(mut status) = status_clone.lock() {
                *status = format!("link down: {}", e);
            }
        }
    });

    let app = PlotApp {
        link,
        status,
        output: cli.output,
        paused: false,
        display_data: Vec::with_capacity(HISTORY_LENGTH),
        visible: [true; 3],
        history_length: HISTORY_LENGTH,
        command: String::new(),
        running: None,
    };

    let options = NativeOptions::default();
    if let Err(e) = run_native("Turntable speed", options, Box::new(|_cc| Ok(Box::new(app)))) {
        eprintln!("Error starting UI: {:?}", e);
    }
}
