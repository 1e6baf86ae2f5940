use minidb::*;
use rand::distributions::Alphanumeric;
use rand::Rng;

fn word(rng: &mut impl Rng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[test]
fn save_then_load_reproduces_store() {
    let mut rng = rand::thread_rng();
    let mut store = Store::new();
    for _ in 0..500 {
        let (klen, vlen) = (rng.gen_range(1..16), rng.gen_range(0..8));
        let k = word(&mut rng, klen);
        // values may carry inner spaces, never a newline
        let v = format!("{} {}", word(&mut rng, vlen), word(&mut rng, 4));
        store.set(k, v);
    }

    let path = std::env::temp_dir().join(format!("minidb-roundtrip-{}.db", std::process::id()));
    std::fs::write(&path, "").unwrap();
    let snap = Snapshot::new(&path);

    snap.save(&store).unwrap();
    let loaded = snap.load().unwrap();
    assert_eq!(loaded, store);

    std::fs::remove_file(path).ok();
}

#[test]
fn empty_store_saves_empty_file() {
    let path = std::env::temp_dir().join(format!("minidb-empty-{}.db", std::process::id()));
    std::fs::write(&path, "stale 1\n").unwrap();
    let snap = Snapshot::new(&path);

    snap.save(&Store::new()).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    assert!(snap.load().unwrap().is_empty());

    std::fs::remove_file(path).ok();
}
