use kube::CustomResourceExt;
use ssp_operator::crd::Ssp;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Ssp::crd())?);
    Ok(())
}
