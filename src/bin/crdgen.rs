//! Prints the generated CustomResourceDefinition YAML for every CRD this
//! control plane owns.
//!
//! ```bash
//! cargo run --bin nauth-crdgen | kubectl apply -f -
//! ```

use kube::core::{CustomResourceExt, Resource};

use nauth_types::{Account, NatsCluster, System, TieredLimit, User};

fn print_crd<K>()
where
    K: CustomResourceExt + Resource,
{
    match serde_yaml::to_string(&K::crd()) {
        Ok(yaml) => {
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("failed to serialize {} CRD to YAML: {e}", K::crd_name());
            std::process::exit(1);
        }
    }
}

fn main() {
    println!("# This file is auto-generated by nauth-crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    println!("#");
    print_crd::<Account>();
    print_crd::<User>();
    print_crd::<TieredLimit>();
    print_crd::<System>();
    print_crd::<NatsCluster>();
}
