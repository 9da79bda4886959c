//! Token-level copy between adapters.
//!
//! No storable is instantiated, so no registry is needed and unknown types
//! pass through untouched.

use crate::error::Result;
use crate::format::{FormatReader, FormatWriter};
use tracing::{info, warn};

/// Copy every token from `reader` to `writer`. Returns the number of tokens
/// copied. Both sides are opened here and closed on every exit path.
pub fn transcode<R, W>(reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: FormatReader + ?Sized,
    W: FormatWriter + ?Sized,
{
    reader.open()?;
    if let Err(err) = writer.open() {
        if let Err(close_err) = reader.close() {
            warn!(error = %close_err, "closing source after failed open also failed");
        }
        return Err(err);
    }

    let result = copy(reader, writer);
    let reader_closed = reader.close();
    let writer_closed = writer.close();
    let copied = result?;
    reader_closed?;
    writer_closed?;
    info!(tokens = copied, "stream transcoded");
    Ok(copied)
}

fn copy<R, W>(reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: FormatReader + ?Sized,
    W: FormatWriter + ?Sized,
{
    let mut copied = 0;
    while let Some(token) = reader.next_token()? {
        writer.write_token(&token)?;
        copied += 1;
    }
    Ok(copied)
}
