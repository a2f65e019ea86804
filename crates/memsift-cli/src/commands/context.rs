use anyhow::Result;

use crate::args::ShellArgs;
use crate::shell::Shell;

/// Hexdump of memory around an address, clamped to the containing region.
pub fn run(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let addr = shell.parse_addr(args.require_positional(0, "ADDRESS")?, args.flag("bswap"))?;
    let size = args.u64_value("size", 0x100)?;

    let store = shell.env.store();
    let (region_start, region_size) = store.region_for_address(addr)?;
    let bytes_before = size.min(addr.get() - region_start.get());
    let bytes_after = size.min(addr.bytes_until(region_start.offset_bytes(region_size as i64)));
    let read_start = addr.offset_bytes(-(bytes_before as i64));
    let data = store.read_slice(read_start, bytes_before + bytes_after)?;

    print_data(data, read_start.get());
    Ok(())
}

pub fn repr(shell: &mut Shell, args: &ShellArgs) -> Result<()> {
    let addr = shell.parse_addr(args.require_positional(0, "ADDRESS")?, args.flag("bswap"))?;
    let opts = shell.repr_options(args)?;
    let mut t = shell.env.traverse(opts);
    println!("{}", t.repr(addr));
    Ok(())
}

/// Classic 16-bytes-per-line hexdump with an ASCII gutter, addressed in
/// the target address space.
fn print_data(data: &[u8], start_addr: u64) {
    for (i, chunk) in data.chunks(16).enumerate() {
        print!("{:016X}: ", start_addr + i as u64 * 16);

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                print!(" ");
            }
            print!("{:02X} ", byte);
        }
        for j in chunk.len()..16 {
            if j == 8 {
                print!(" ");
            }
            print!("   ");
        }

        print!(" |");
        for byte in chunk {
            if (0x20..0x7F).contains(byte) {
                print!("{}", *byte as char);
            } else {
                print!(".");
            }
        }
        for _ in chunk.len()..16 {
            print!(" ");
        }
        println!("|");
    }
}
