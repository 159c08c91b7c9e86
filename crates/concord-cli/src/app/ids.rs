use anyhow::Context;
use concord::{
    DatedLayout, DatedParts, DatedSequenceIdGenerator, Fixed, IdGenerator, InstanceIdentity,
    SequenceIdGenerator, SequenceLayout,
};
use std::io::{self, BufWriter, Write};

/// Prints `count` IDs to stdout, one per line.
pub fn print_ids(identity: &InstanceIdentity<Fixed>, count: usize, dated: bool) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if dated {
        let generator = DatedSequenceIdGenerator::with_local_calendar(identity, DatedLayout::default())
            .context("cannot build the dated generator")?;
        write_ids(&generator, count, &mut out)?;
    } else {
        let generator = SequenceIdGenerator::with_wall_clock(identity, SequenceLayout::default())
            .context("cannot build the sequence generator")?;
        write_ids(&generator, count, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

fn write_ids(generator: &impl IdGenerator, count: usize, out: &mut impl Write) -> anyhow::Result<()> {
    for _ in 0..count {
        writeln!(out, "{}", generator.next_id()?)?;
    }
    Ok(())
}

/// Prints the fields of `id` to stdout.
pub fn inspect(id: u64, dated: bool) -> anyhow::Result<()> {
    let report = if dated {
        describe_dated(DatedLayout::default().decompose(id))
    } else {
        let layout = SequenceLayout::default();
        let parts = layout.decompose(id);
        format!(
            "timestamp: {} ms since epoch\nunix_ms:   {}\ninstance:  {}\nsequence:  {}",
            parts.timestamp,
            layout.unix_millis(id),
            parts.instance,
            parts.sequence
        )
    };
    writeln!(io::stdout(), "{report}")?;
    Ok(())
}

fn describe_dated(parts: DatedParts) -> String {
    let (yy, mm, dd) = (parts.date / 10_000, parts.date / 100 % 100, parts.date % 100);
    let (h, m, s) = (parts.second / 3_600, parts.second / 60 % 60, parts.second % 60);
    format!(
        "date:      20{yy:02}-{mm:02}-{dd:02}\ntime:      {h:02}:{m:02}:{s:02}\ninstance:  {}\nsequence:  {}",
        parts.instance, parts.sequence
    )
}
