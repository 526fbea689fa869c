mod spatial_batch_norm;
