//! GeoIP table loading and lookup properties.

use std::io::Write;
use std::net::Ipv4Addr;

use proptest::prelude::*;
use tally_api::{CidrTable, GeoIpLookup};

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# network,country").unwrap();
    writeln!(file, "10.0.0.0/8,de").unwrap();
    writeln!(file, "10.1.0.0/16,AT").unwrap();
    writeln!(file, "2001:db8::/32,JP").unwrap();

    let table = CidrTable::load(file.path()).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.country("10.2.3.4").unwrap(), "DE");
    assert_eq!(table.country("10.1.3.4").unwrap(), "AT");
    assert_eq!(table.country("2001:db8::1").unwrap(), "JP");
    assert!(table.country("192.168.0.1").is_err());
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(CidrTable::load(&dir.path().join("absent.csv")).is_err());
}

proptest! {
    #[test]
    fn prop_every_address_in_a_slash_eight_matches(a in 1u8..=223, b: u8, c: u8, d: u8) {
        let table = CidrTable::parse(&format!("{a}.0.0.0/8,ZZ")).unwrap();
        let ip = Ipv4Addr::new(a, b, c, d).to_string();
        prop_assert_eq!(table.country(&ip).unwrap(), "ZZ");
    }

    #[test]
    fn prop_lookup_never_panics_on_garbage(input in ".{0,40}") {
        let table = CidrTable::parse("0.0.0.0/0,XX").unwrap();
        let _ = table.country(&input);
    }
}
