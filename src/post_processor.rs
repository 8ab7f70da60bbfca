use std::io::Write;

use crate::{error::RelaxError, network::Network};

fn create(path: &str) -> Result<std::fs::File, RelaxError> {
    match std::fs::File::create(path) {
        Ok(f) => Ok(f),
        Err(err) => Err(RelaxError::PostProcessor(format!(
            "Failed to create {path}: {err}"
        ))),
    }
}

fn write_row(file: &mut std::fs::File, path: &str, row: String) -> Result<(), RelaxError> {
    match file.write_all(row.as_bytes()) {
        Ok(()) => Ok(()),
        Err(err) => Err(RelaxError::PostProcessor(format!(
            "Failed to write {path}: {err}"
        ))),
    }
}

/// Writes relaxation results to two CSV files
///
/// # Arguments
/// * `network` - A reference to the relaxed network
/// * `vertices_output` - The filename of the output vertices csv
/// * `edges_output` - The filename of the output edges csv
pub fn csv_output(
    network: &Network,
    vertices_output: &str,
    edges_output: &str,
) -> Result<(), RelaxError> {
    let mut vertices_file = create(vertices_output)?;
    let mut edges_file = create(edges_output)?;

    // Write vertices
    write_row(
        &mut vertices_file,
        vertices_output,
        "key,x,y,z,is_fixed,rx,ry,rz\n".to_owned(),
    )?;
    for key in network.vertices() {
        let point = network.vertex_coordinates(key)?;
        let attributes = network.vertex_attributes(key)?;
        write_row(
            &mut vertices_file,
            vertices_output,
            format!(
                "{key},{x},{y},{z},{is_fixed},{rx},{ry},{rz}\n",
                x = point.x,
                y = point.y,
                z = point.z,
                is_fixed = attributes.is_fixed,
                rx = attributes.reaction[0],
                ry = attributes.reaction[1],
                rz = attributes.reaction[2],
            ),
        )?;
    }

    // Write edges
    write_row(&mut edges_file, edges_output, "u,v,l0,length,force\n".to_owned())?;
    for (index, (u, v)) in network.edges().enumerate() {
        let attributes = network.edge_attributes(index)?;
        write_row(
            &mut edges_file,
            edges_output,
            format!(
                "{u},{v},{l0},{length},{force}\n",
                l0 = attributes.l0,
                length = attributes.length,
                force = attributes.force,
            ),
        )?;
    }

    println!(
        "info: wrote output to {} and {}",
        vertices_output, edges_output
    );

    Ok(())
}
