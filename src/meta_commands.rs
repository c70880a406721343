use crate::Context;

#[derive(Debug, PartialEq, Eq)]
pub enum MetaCommandError {
    UnrecognizedCommand,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MetaAction {
    Exit,
    Print(String),
}

pub fn handle_meta_command<const PTES_PER_PAGE: usize, const NR_FRAMES: usize>(
    input: &str,
    ctx: &Context<PTES_PER_PAGE, NR_FRAMES>,
) -> Result<MetaAction, MetaCommandError> {
    let report = match input {
        ".exit" => return Ok(MetaAction::Exit),
        ".ptes" => dump_page_table(ctx),
        ".frames" => dump_frames(ctx),
        ".tlb" => dump_tlb(ctx),
        ".ps" => dump_processes(ctx),
        ".check" => match ctx.check_mapcounts() {
            Ok(()) => String::from("mapcounts consistent"),
            Err(err) => err.to_string(),
        },
        _ => return Err(MetaCommandError::UnrecognizedCommand),
    };
    Ok(MetaAction::Print(report))
}

fn dump_page_table<const PTES_PER_PAGE: usize, const NR_FRAMES: usize>(
    ctx: &Context<PTES_PER_PAGE, NR_FRAMES>,
) -> String {
    let mut out = format!("pid {}\n", ctx.current_pid());
    for (vpn, pte) in ctx.ptbr().iter() {
        out.push_str(&format!(
            "  {:>4} -> {:>4} {}{} {:?}\n",
            vpn,
            pte.pfn.map_or(String::from("-"), |pfn| pfn.to_string()),
            if pte.valid { 'v' } else { '-' },
            if pte.writable { 'w' } else { '-' },
            pte.rights,
        ));
    }
    out
}

fn dump_frames<const PTES_PER_PAGE: usize, const NR_FRAMES: usize>(
    ctx: &Context<PTES_PER_PAGE, NR_FRAMES>,
) -> String {
    let mut out = format!("{} of {} frames free\n", ctx.frames().free_frames(), NR_FRAMES);
    for (pfn, mapcount) in ctx.frames().iter_used() {
        out.push_str(&format!("  {:>4}: {}\n", pfn, mapcount));
    }
    out
}

fn dump_tlb<const PTES_PER_PAGE: usize, const NR_FRAMES: usize>(
    ctx: &Context<PTES_PER_PAGE, NR_FRAMES>,
) -> String {
    let mut out = format!("{} of {} entries used\n", ctx.tlb().len(), ctx.tlb().capacity());
    for entry in ctx.tlb().iter() {
        out.push_str(&format!("  {:>4} -> {:>4}\n", entry.vpn, entry.pfn));
    }
    out
}

fn dump_processes<const PTES_PER_PAGE: usize, const NR_FRAMES: usize>(
    ctx: &Context<PTES_PER_PAGE, NR_FRAMES>,
) -> String {
    ctx.processes()
        .enumerate()
        .map(|(i, process)| {
            format!(
                "{} pid {:>3}: {} pages\n",
                if i == 0 { '*' } else { ' ' },
                process.pid,
                process.page_table.valid_entries()
            )
        })
        .collect()
}
