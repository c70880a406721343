use std::{cmp::Ordering, env, fs, process::ExitCode};

use cursive_table_view::{TableView, TableViewItem};
use log::error;
use vm_sim::{commands::replay, Context, PageTableEntry, Pfn, Vpn};

use cursive::{
    view::{Resizable, Scrollable},
    views::{Dialog, DummyView, LinearLayout, TextView},
};

const PTES_PER_PAGE: usize = 16;
const NR_FRAMES: usize = 128;

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
enum PteColumn {
    Vpn,
    Pfn,
    Flags,
    Rights,
}

#[derive(Debug, Clone, PartialEq)]
struct PteRow {
    vpn: Vpn,
    pte: PageTableEntry,
}

impl TableViewItem<PteColumn> for PteRow {
    fn to_column(&self, column: PteColumn) -> String {
        match column {
            PteColumn::Vpn => self.vpn.to_string(),
            PteColumn::Pfn => self
                .pte
                .pfn
                .map_or(String::from("-"), |pfn| pfn.to_string()),
            PteColumn::Flags => format!(
                "{}{}",
                if self.pte.valid { 'v' } else { '-' },
                if self.pte.writable { 'w' } else { '-' }
            ),
            PteColumn::Rights => self
                .pte
                .rights
                .map_or(String::from("-"), |rights| format!("{:?}", rights)),
        }
    }

    fn cmp(&self, other: &Self, column: PteColumn) -> Ordering
    where
        Self: Sized,
    {
        match column {
            PteColumn::Pfn => self.pte.pfn.cmp(&other.pte.pfn),
            _ => self.vpn.cmp(&other.vpn),
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
enum FrameColumn {
    Pfn,
    Mapcount,
}

#[derive(Debug, Clone, PartialEq)]
struct FrameRow {
    pfn: Pfn,
    mapcount: u32,
}

impl TableViewItem<FrameColumn> for FrameRow {
    fn to_column(&self, column: FrameColumn) -> String {
        match column {
            FrameColumn::Pfn => self.pfn.to_string(),
            FrameColumn::Mapcount => self.mapcount.to_string(),
        }
    }

    fn cmp(&self, other: &Self, column: FrameColumn) -> Ordering
    where
        Self: Sized,
    {
        match column {
            FrameColumn::Pfn => self.pfn.cmp(&other.pfn),
            FrameColumn::Mapcount => self.mapcount.cmp(&other.mapcount),
        }
    }
}

fn make_pte_table(ctx: &Context<PTES_PER_PAGE, NR_FRAMES>) -> TableView<PteRow, PteColumn> {
    let mut table = TableView::<PteRow, PteColumn>::new()
        .column(PteColumn::Vpn, "vpn", |c| c.width(6))
        .column(PteColumn::Pfn, "pfn", |c| c.width(6))
        .column(PteColumn::Flags, "flags", |c| c.width(6))
        .column(PteColumn::Rights, "rights", |c| c);
    table.set_items(
        ctx.ptbr()
            .iter()
            .map(|(vpn, pte)| PteRow { vpn, pte })
            .collect(),
    );
    table
}

fn make_frame_table(
    ctx: &Context<PTES_PER_PAGE, NR_FRAMES>,
) -> TableView<FrameRow, FrameColumn> {
    let mut table = TableView::<FrameRow, FrameColumn>::new()
        .column(FrameColumn::Pfn, "pfn", |c| c.width(6))
        .column(FrameColumn::Mapcount, "mapcount", |c| c);
    table.set_items(
        ctx.frames()
            .iter_used()
            .map(|(pfn, mapcount)| FrameRow { pfn, mapcount })
            .collect(),
    );
    table
}

fn summary(ctx: &Context<PTES_PER_PAGE, NR_FRAMES>, log: &str) -> String {
    let ready: Vec<String> = ctx.ready_pids().iter().map(|pid| pid.to_string()).collect();
    let consistency = match ctx.check_mapcounts() {
        Ok(()) => String::from("mapcounts consistent"),
        Err(err) => err.to_string(),
    };
    format!(
        "running pid {}, ready [{}]\n{} free frames, {} tlb entries\n{}\n\n{}",
        ctx.current_pid(),
        ready.join(", "),
        ctx.frames().free_frames(),
        ctx.tlb().len(),
        consistency,
        log
    )
}

fn main() -> ExitCode {
    env_logger::init();
    let mut ctx = Context::<PTES_PER_PAGE, NR_FRAMES>::init();

    let mut log = String::new();
    if let Some(path) = env::args().nth(1) {
        let script = match fs::read_to_string(&path) {
            Ok(script) => script,
            Err(err) => {
                error!("cannot read {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        };
        let steps = match replay(&mut ctx, &script) {
            Ok(steps) => steps,
            Err(err) => {
                error!("{}: {}", path, err);
                return ExitCode::FAILURE;
            }
        };
        for step in steps {
            let result = match step.result {
                Ok(outcome) => outcome.to_string(),
                Err(err) => format!("error: {}", err),
            };
            log.push_str(&format!("{:>4}: {:?} => {}\n", step.line, step.command, result));
        }
    }

    let mut siv = cursive::default();
    siv.add_global_callback('q', |s| s.quit());

    let tables = LinearLayout::horizontal()
        .child(
            Dialog::around(make_pte_table(&ctx).min_size((40, 20)))
                .title(format!("page table of pid {}", ctx.current_pid())),
        )
        .child(DummyView)
        .child(Dialog::around(make_frame_table(&ctx).min_size((20, 20))).title("frames"));
    siv.add_layer(
        Dialog::around(
            LinearLayout::vertical()
                .child(tables)
                .child(TextView::new(summary(&ctx, &log)).scrollable()),
        )
        .title("vm_sim")
        .button("Quit", |s| s.quit()),
    );
    siv.run();
    ExitCode::SUCCESS
}
