use std::fs::File;
use std::ops::Deref;

/// A whole trace file, either memory mapped or read into a buffer
#[derive(Debug)]
pub enum Trace {
    #[cfg(unix)]
    Mapped(memmap2::Mmap),
    Buffered(Vec<u8>),
}

impl Deref for Trace {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            #[cfg(unix)]
            Trace::Mapped(m) => &m[..],
            Trace::Buffered(b) => &b[..],
        }
    }
}

pub fn load_trace(file: File) -> Result<Trace, String> {
    let len = file.metadata().map_err(|e| format!("Couldn't read the trace file's metadata: {e}"))?.len();
    // Mapping an empty file fails on some systems
    if len == 0 {
        return Ok(Trace::Buffered(Vec::new()));
    }
    // Memory map the file for speed on unix systems
    #[cfg(unix)]
    {
        use memmap2::{Advice, Mmap};
        // The simulator only ever reads the trace front to back
        unsafe {
            let m = Mmap::map(&file).map_err(|e| format!("Couldn't memory map the file: {e}"))?;
            m.advise(Advice::Sequential).map_err(|e| format!("Failed to provide access advice to the OS, {e}"))?;
            Ok(Trace::Mapped(m))
        }
    }
    // Compatibility on other systems
    #[cfg(not(unix))]
    {
        use std::io::Read;
        let mut file = file;
        let mut buffer = Vec::with_capacity(len as usize);
        file.read_to_end(&mut buffer).map_err(|e| format!("Couldn't read the trace file: {e}"))?;
        Ok(Trace::Buffered(buffer))
    }
}
