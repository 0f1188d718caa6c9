//! cargo mpirun -n 4 --features mpi-support --example mpi_ring
// Each rank sends per-cell coordinates and a cell count to its successor in
// a ring, then receives its predecessor's through a type-tag registry.

#[cfg(feature = "mpi-support")]
fn main() {
    use mesh_exchange::prelude::*;
    use std::process;

    type Coords = DataHandler<[f64; 3], ArrayCodec<f64, 3>>;

    let comm = match MpiComm::new() {
        Ok(comm) => comm,
        Err(e) => {
            eprintln!("MPI initialization failed: {e}");
            process::exit(1);
        }
    };
    let rank = comm.rank();
    let size = comm.size();
    let to = (rank + 1) % size;
    let from = (rank + size - 1) % size;

    let mut registry = HandlerRegistry::<MpiComm>::new();
    let coords_tag = registry
        .register::<[f64; 3], ArrayCodec<f64, 3>>()
        .expect("fresh registry");
    let count_tag = registry.register::<u64, ScalarCodec<u64>>().expect("fresh registry");
    let channel = |t: TypeTag| CommTag::new(t.as_i32() as u16);

    // 1) Build this rank's payload: one centroid per local cell
    let n_cells = 2 + rank;
    let centroids: Vec<[f64; 3]> = (0..n_cells)
        .map(|c| [rank as f64, c as f64, 0.5])
        .collect();

    // 2) Send both collections to the successor
    if let Err(e) = Coords::from_vec(centroids).send(to, channel(coords_tag), &comm) {
        eprintln!("[rank {rank}] send failed: {e}");
        process::exit(1);
    }
    if let Err(e) = DataHandler::<u64>::from_vec(vec![n_cells as u64]).send(to, channel(count_tag), &comm) {
        eprintln!("[rank {rank}] send failed: {e}");
        process::exit(1);
    }

    // 3) Receive from the predecessor, dispatching on the type tag
    for tag in registry.tags().collect::<Vec<_>>() {
        match registry.receive_as(tag, from, channel(tag), &comm) {
            Ok((handler, got)) => {
                println!(
                    "[rank {rank}] received {} x type {tag} ({} bytes) from rank {from}",
                    got.count, got.envelope.len
                );
                if let Some(c) = handler.downcast_ref::<[f64; 3], ArrayCodec<f64, 3>>() {
                    assert!(c.data().unwrap_or(&[]).iter().all(|p| p[0] == from as f64));
                }
            }
            Err(e) => {
                eprintln!("[rank {rank}] receive failed: {e}");
                process::exit(1);
            }
        }
    }
}

#[cfg(not(feature = "mpi-support"))]
fn main() {
    eprintln!("This example requires the `mpi-support` feature.");
}
